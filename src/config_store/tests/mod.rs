//! Unit tests for the config store engine.
//! Sources are in-memory; timing tests run on paused Tokio time.

#![allow(clippy::panic)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use crate::{
    config_store::{ChangeEvent, ChangeKind, ConfigStore, ConfigStoreBuilder},
    core::ConfigError,
    settings::{ReloadStrategy, TemplateOptions},
    source::{MemorySource, SourceOptions},
    transform::AesGcmCipher,
};

fn memory(name: &str, pairs: &[(&str, &str)]) -> Arc<MemorySource> {
    Arc::new(MemorySource::with_values(name, pairs.iter().copied()))
}

fn builder(sources: &[(&Arc<MemorySource>, SourceOptions)]) -> ConfigStoreBuilder {
    sources
        .iter()
        .fold(ConfigStore::builder(), |builder, (source, options)| {
            builder.add_shared_source((*source).clone(), options.clone())
        })
}

fn batches(events: &[ChangeEvent]) -> usize {
    events.iter().filter(|e| e.as_batch().is_some()).count()
}

fn drain(sub: &mut crate::config_store::Subscription) -> Vec<ChangeEvent> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

mod merge {
    use super::*;

    #[tokio::test]
    async fn higher_level_overrides_lower() {
        let base = memory("base", &[("Setting1", "Base1"), ("Setting2", "Base2")]);
        let over = memory("override", &[("Setting1", "Override1")]);

        let store = builder(&[
            (&base, SourceOptions::at_level(0)),
            (&over, SourceOptions::at_level(1)),
        ])
        .build()
        .await
        .unwrap();

        assert_eq!(store.get("Setting1").unwrap().as_deref(), Some("Override1"));
        assert_eq!(store.get("Setting2").unwrap().as_deref(), Some("Base2"));
        assert_eq!(store.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn negative_levels_and_gaps() {
        let low = memory("low", &[("K", "low")]);
        let high = memory("high", &[("K", "high")]);

        let store = builder(&[
            (&high, SourceOptions::at_level(-3)),
            (&low, SourceOptions::at_level(-1000)),
        ])
        .build()
        .await
        .unwrap();

        assert_eq!(store.get("K").unwrap().as_deref(), Some("high"));
        let resolved = store.resolve("K").unwrap();
        assert_eq!(resolved.source, "high");
        assert_eq!(resolved.level, -3);
    }

    #[tokio::test]
    async fn keys_are_case_sensitive() {
        let source = memory("s", &[("A:B", "upper")]);
        let store = builder(&[(&source, SourceOptions::at_level(0))]).build().await.unwrap();

        assert!(store.exists("A:B"));
        assert!(!store.exists("a:b"));
    }

    #[tokio::test]
    async fn same_level_later_registration_wins_reads_and_writes() {
        let first = memory("first", &[("K", "first")]);
        let second = memory("second", &[("K", "second")]);

        let store = builder(&[
            (&first, SourceOptions::at_level(1).writeable()),
            (&second, SourceOptions::at_level(1).writeable()),
        ])
        .build()
        .await
        .unwrap();

        assert_eq!(store.get("K").unwrap().as_deref(), Some("second"));

        store.set("K", "written").unwrap();
        store.save(None).await.unwrap();

        assert_eq!(second.stored("K").as_deref(), Some("written"));
        assert_eq!(first.stored("K").as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn get_many_preserves_caller_order() {
        let source = memory("s", &[("a", "1"), ("b", "2"), ("c", "3"), ("z", "26")]);
        let store = builder(&[(&source, SourceOptions::at_level(0))]).build().await.unwrap();

        let mut seen = Vec::new();
        store
            .get_many(&["z", "a", "missing", "c"], |key, value| {
                seen.push((key.to_string(), value));
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![
                ("z".to_string(), Some("26".to_string())),
                ("a".to_string(), Some("1".to_string())),
                ("missing".to_string(), None),
                ("c".to_string(), Some("3".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn sections_and_children() {
        let source = memory(
            "s",
            &[("Db:Host", "h"), ("Db:Port", "1"), ("Db:Pool:Max", "5"), ("Log", "x")],
        );
        let store = builder(&[(&source, SourceOptions::at_level(0))]).build().await.unwrap();

        let section = store.get_section("Db").unwrap();
        assert_eq!(section.len(), 3);
        assert_eq!(section["Pool:Max"].as_deref(), Some("5"));
        assert_eq!(store.child_keys("Db"), vec!["Host", "Pool", "Port"]);
    }
}

mod writes {
    use super::*;

    #[tokio::test]
    async fn read_your_writes_before_save() {
        let source = memory("s", &[("K", "old")]);
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();

        store.set("K", "new").unwrap();

        assert_eq!(store.get("K").unwrap().as_deref(), Some("new"));
        assert_eq!(source.stored("K").as_deref(), Some("old"));
        assert_eq!(store.pending_changes(0).len(), 1);
    }

    #[tokio::test]
    async fn unqualified_write_targets_highest_writeable() {
        let low = memory("low", &[]);
        let mid = memory("mid", &[]);
        let top = memory("top", &[]);

        let store = builder(&[
            (&low, SourceOptions::at_level(0).writeable()),
            (&mid, SourceOptions::at_level(5).writeable()),
            (&top, SourceOptions::at_level(9)),
        ])
        .build()
        .await
        .unwrap();

        store.set("K", "v").unwrap();
        store.set_at(0, "L", "v").unwrap();
        store.save(None).await.unwrap();

        assert_eq!(mid.stored("K").as_deref(), Some("v"));
        assert_eq!(low.stored("L").as_deref(), Some("v"));
        assert_eq!(low.stored("K"), None);
    }

    #[tokio::test]
    async fn writes_without_writeable_source_fail() {
        let source = memory("s", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0))]).build().await.unwrap();

        assert_eq!(
            store.set("K", "v"),
            Err(ConfigError::NoWritableSource { level: None })
        );
        assert_eq!(
            store.remove_at(7, "K"),
            Err(ConfigError::NoWritableSource { level: Some(7) })
        );
    }

    #[tokio::test]
    async fn removal_hides_lower_levels() {
        let base = memory("base", &[("K", "base")]);
        let user = memory("user", &[]);

        let store = builder(&[
            (&base, SourceOptions::at_level(0)),
            (&user, SourceOptions::at_level(1).writeable()),
        ])
        .build()
        .await
        .unwrap();

        store.remove("K").unwrap();

        assert!(!store.exists("K"));
        assert_eq!(store.get("K").unwrap(), None);
    }

    #[tokio::test]
    async fn remove_save_and_reload_fresh_instance() {
        let source = memory("s", &[("K", "v"), ("Other", "o")]);

        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();
        store.remove("K").unwrap();
        store.save(None).await.unwrap();
        store.close();

        let fresh = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();
        assert!(!fresh.exists("K"));
        assert!(fresh.exists("Other"));
    }

    #[tokio::test]
    async fn save_clears_overlay_and_keeps_value_visible() {
        let source = memory("s", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();

        store.set("K", "v").unwrap();
        store.save(Some(0)).await.unwrap();

        assert!(store.pending_changes(0).is_empty());
        assert_eq!(store.get("K").unwrap().as_deref(), Some("v"));
        assert_eq!(store.source_values(0).unwrap()["K"].as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn empty_or_unknown_saves_do_nothing() {
        let source = memory("s", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();

        store.save(None).await.unwrap();
        assert_eq!(source.save_count(), 0);

        store.set("K", "v").unwrap();
        store.save(Some(42)).await.unwrap();
        assert_eq!(source.save_count(), 0);
        assert_eq!(store.pending_changes(0).len(), 1);
    }

    #[tokio::test]
    async fn partial_save_failure_keeps_other_commits() {
        let good = memory("good", &[]);
        let bad = memory("bad", &[]);

        let store = builder(&[
            (&good, SourceOptions::at_level(0).writeable()),
            (&bad, SourceOptions::at_level(1).writeable()),
        ])
        .build()
        .await
        .unwrap();

        store.set_at(0, "A", "1").unwrap();
        store.set_at(1, "B", "2").unwrap();
        bad.set_failing(true);

        let err = store.save(None).await.unwrap_err();
        assert!(matches!(err, ConfigError::Persist { ref name, .. } if name == "bad"));

        assert_eq!(good.stored("A").as_deref(), Some("1"));
        assert!(store.pending_changes(0).is_empty());
        assert_eq!(store.pending_changes(1).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_save_keeps_overlay() {
        let source = Arc::new(
            MemorySource::new("slow").with_save_delay(Duration::from_secs(5)),
        );
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();
        store.set("K", "v").unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = store.save_with_cancel(None, &token).await.unwrap_err();
        assert_eq!(err, ConfigError::Cancelled { name: "slow".to_string() });
        assert_eq!(store.pending_changes(0).len(), 1);
        assert_eq!(source.save_count(), 0);
        assert_eq!(store.get("K").unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn discard_drops_pending_edits() {
        let source = memory("s", &[("K", "persisted")]);
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();

        store.set("K", "pending").unwrap();
        store.discard(None);

        assert_eq!(store.get("K").unwrap().as_deref(), Some("persisted"));
        assert!(store.pending_changes(0).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sets_do_not_lose_updates() {
        let source = memory("s", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.set(&format!("K{i}"), &i.to_string()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for i in 0..64 {
            assert_eq!(store.get(&format!("K{i}")).unwrap(), Some(i.to_string()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn saves_serialise_per_source_and_overlap_across_sources() {
        let a = Arc::new(MemorySource::new("a").with_save_delay(Duration::from_secs(1)));
        let b = Arc::new(MemorySource::new("b").with_save_delay(Duration::from_secs(1)));
        let store = builder(&[
            (&a, SourceOptions::at_level(0).writeable()),
            (&b, SourceOptions::at_level(1).writeable()),
        ])
        .build()
        .await
        .unwrap();

        store.set_at(0, "A1", "1").unwrap();
        store.set_at(1, "B1", "1").unwrap();

        let started = tokio::time::Instant::now();
        let (first, second) = tokio::join!(store.save(None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.set_at(0, "A2", "2").unwrap();
            store.set_at(1, "B2", "2").unwrap();
            store.save(None).await
        });
        first.unwrap();
        second.unwrap();
        let elapsed = started.elapsed();

        for source in [&a, &b] {
            assert_eq!(source.max_concurrent_saves(), 1);
            assert_eq!(source.save_count(), 2);
        }
        assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
        assert_eq!(a.stored("A2").as_deref(), Some("2"));
        assert_eq!(b.stored("B2").as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn save_during_slow_reload_is_kept() {
        let source = Arc::new(
            MemorySource::with_values("slow", [("K", "old")]).with_load_delay(Duration::from_millis(200)),
        );
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .reload_strategy(ReloadStrategy::Manual)
            .build()
            .await
            .unwrap();

        let reloading = {
            let store = store.clone();
            tokio::spawn(async move { store.reload().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        store.set("K", "new").unwrap();
        store.save(None).await.unwrap();
        reloading.await.unwrap().unwrap();

        assert_eq!(source.stored("K").as_deref(), Some("new"));
        assert_eq!(store.get("K").unwrap().as_deref(), Some("new"));
        assert_eq!(store.source_values(0).unwrap()["K"].as_deref(), Some("new"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn typed_reads_follow_concurrent_sets() {
        let source = memory("s", &[("N", "0")]);
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();

        for round in 0..200_i64 {
            let stop = Arc::new(AtomicBool::new(false));
            let reader = {
                let store = store.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        store.get_value::<i64>("N").unwrap();
                    }
                })
            };

            let base = round * 20;
            for i in 1..=20 {
                store.set("N", &(base + i).to_string()).unwrap();
            }
            stop.store(true, Ordering::Release);
            reader.join().unwrap();

            assert_eq!(store.get_value::<i64>("N").unwrap(), base + 20, "round {round}");
        }
    }

    #[tokio::test]
    async fn local_writes_do_not_publish() {
        let source = memory("s", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();
        let mut sub = store.subscribe();

        store.set("K", "v").unwrap();
        store.remove("K").unwrap();

        assert!(drain(&mut sub).is_empty());
        assert!(store.change_history().is_empty());
    }
}

mod reload {
    use super::*;

    async fn watched(
        strategy: ReloadStrategy,
        source: &Arc<MemorySource>,
    ) -> ConfigStore {
        builder(&[(source, SourceOptions::at_level(0).reload_on_change())])
            .reload_strategy(strategy)
            .debounce(Duration::from_millis(100))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_signals_produces_one_batch() {
        let source = memory("remote", &[("K", "0")]);
        let store = watched(ReloadStrategy::Eager, &source).await;
        let mut sub = store.subscribe();

        for i in 1..=5 {
            source.inject("K", i.to_string());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let events = drain(&mut sub);
        assert_eq!(batches(&events), 1);

        let batch = events[0].as_batch().unwrap();
        let change = batch.get("K").unwrap();
        assert_eq!(change.kind, ChangeKind::Modified);
        assert_eq!(change.old_value.as_deref(), Some("0"));
        assert_eq!(change.new_value.as_deref(), Some("5"));
        assert_eq!(store.get("K").unwrap().as_deref(), Some("5"));
        assert_eq!(store.change_history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn separated_signals_produce_separate_batches() {
        let source = memory("remote", &[]);
        let store = watched(ReloadStrategy::Eager, &source).await;
        let mut sub = store.subscribe();

        source.inject("A", "1");
        tokio::time::sleep(Duration::from_millis(300)).await;
        source.inject("B", "2");
        tokio::time::sleep(Duration::from_millis(300)).await;
        source.remove_external("A");
        tokio::time::sleep(Duration::from_millis(300)).await;

        let events = drain(&mut sub);
        assert_eq!(batches(&events), 3);
        assert_eq!(
            events[2].as_batch().unwrap().get("A").unwrap().kind,
            ChangeKind::Removed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn signal_without_visible_change_publishes_nothing() {
        let source = memory("remote", &[("K", "v")]);
        let store = watched(ReloadStrategy::Eager, &source).await;
        let mut sub = store.subscribe();

        source.notify();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(drain(&mut sub).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_strategy_defers_to_next_read() {
        let source = memory("remote", &[("K", "old")]);
        let store = watched(ReloadStrategy::Lazy, &source).await;
        let mut sub = store.subscribe();

        source.inject("K", "new");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(drain(&mut sub).is_empty());

        assert_eq!(store.get("K").unwrap().as_deref(), Some("new"));
        assert_eq!(batches(&drain(&mut sub)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_strategy_ignores_signals() {
        let source = memory("remote", &[("K", "old")]);
        let store = watched(ReloadStrategy::Manual, &source).await;
        let mut sub = store.subscribe();

        source.inject("K", "new");
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(store.get("K").unwrap().as_deref(), Some("old"));
        assert!(drain(&mut sub).is_empty());

        let batch = store.reload().await.unwrap().unwrap();
        assert_eq!(batch.get("K").unwrap().new_value.as_deref(), Some("new"));
        assert_eq!(store.get("K").unwrap().as_deref(), Some("new"));
        assert_eq!(batches(&drain(&mut sub)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reload_rolls_back() {
        let source = memory("remote", &[("K", "old")]);
        let store = watched(ReloadStrategy::Eager, &source).await;
        let mut sub = store.subscribe();

        source.set_failing(true);
        source.inject("K", "new");
        tokio::time::sleep(Duration::from_millis(500)).await;

        let events = drain(&mut sub);
        assert_eq!(events.len(), 1);
        let record = events[0].as_error().unwrap();
        assert!(record.rolled_back);
        assert_eq!(record.affected_levels.iter().copied().collect::<Vec<_>>(), vec![0]);
        assert!(matches!(record.error, ConfigError::Reload { ref name, .. } if name == "remote"));
        assert_eq!(store.get("K").unwrap().as_deref(), Some("old"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reload_without_rollback_applies_what_loaded() {
        let healthy = memory("healthy", &[("A", "1")]);
        let broken = memory("broken", &[("B", "1")]);

        let store = builder(&[
            (&healthy, SourceOptions::at_level(0).reload_on_change()),
            (&broken, SourceOptions::at_level(3).reload_on_change()),
        ])
        .rollback_on_error(false)
        .build()
        .await
        .unwrap();
        let mut sub = store.subscribe();

        broken.set_failing(true);
        healthy.inject("A", "2");
        broken.inject("B", "2");
        tokio::time::sleep(Duration::from_millis(500)).await;

        let events = drain(&mut sub);
        assert_eq!(batches(&events), 1);
        let record = events.iter().find_map(ChangeEvent::as_error).unwrap();
        assert!(!record.rolled_back);
        assert!(record.affected_levels.contains(&3));

        assert_eq!(store.get("A").unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("B").unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn explicit_reload_reports_failure() {
        let source = memory("remote", &[("K", "v")]);
        let store = builder(&[(&source, SourceOptions::at_level(0))]).build().await.unwrap();
        let mut sub = store.subscribe();

        source.set_failing(true);
        let err = store.reload().await.unwrap_err();

        assert!(matches!(err, ConfigError::Reload { .. }));
        assert!(drain(&mut sub)[0].as_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn prefix_filters_limit_published_keys() {
        let source = memory("remote", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0).reload_on_change())])
            .key_prefix_filters(["Db:"])
            .build()
            .await
            .unwrap();
        let mut sub = store.subscribe();

        source.inject("Db:Host", "h");
        source.inject("Log:Level", "debug");
        tokio::time::sleep(Duration::from_millis(500)).await;

        let events = drain(&mut sub);
        let batch = events[0].as_batch().unwrap();
        assert_eq!(batch.keys().collect::<Vec<_>>(), vec!["Db:Host"]);
        assert_eq!(store.get("Log:Level").unwrap().as_deref(), Some("debug"));
    }

    #[tokio::test(start_paused = true)]
    async fn filtered_out_changes_publish_nothing() {
        let source = memory("remote", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0).reload_on_change())])
            .key_prefix_filters(["Db:"])
            .build()
            .await
            .unwrap();
        let mut sub = store.subscribe();

        source.inject("Log:Level", "debug");
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(drain(&mut sub).is_empty());
        assert!(store.change_history().is_empty());
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let source = memory("remote", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0))])
            .history_size(2)
            .build()
            .await
            .unwrap();

        for i in 0..3 {
            source.inject(format!("K{i}"), "v");
            store.reload().await.unwrap();
        }

        let history = store.change_history();
        assert_eq!(history.len(), 2);
        assert!(history[0].contains("K1"));
        assert!(history[1].contains("K2"));
        assert_ne!(history[0].batch_id, history[1].batch_id);

        store.clear_history();
        assert!(store.change_history().is_empty());
    }

    #[tokio::test]
    async fn reload_invalidates_typed_cache() {
        let source = memory("remote", &[("Port", "80")]);
        let store = builder(&[(&source, SourceOptions::at_level(0))]).build().await.unwrap();

        assert_eq!(store.get_value::<u16>("Port").unwrap(), 80);
        let version = store.cache_version();

        source.inject("Port", "8080");
        store.reload().await.unwrap();

        assert!(store.cache_version() > version);
        assert_eq!(store.get_value::<u16>("Port").unwrap(), 8080);
    }
}

mod disposal {
    use super::*;

    #[tokio::test]
    async fn close_completes_stream_once() {
        let source = memory("s", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0))]).build().await.unwrap();
        let mut sub = store.subscribe();

        assert!(store.close());
        assert!(!store.close());
        assert!(store.is_closed());

        assert_eq!(sub.recv().await, Some(ChangeEvent::Completed));
        assert_eq!(sub.recv().await, None);

        let mut late = store.subscribe();
        assert_eq!(late.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn twenty_concurrent_disposals_complete_once() {
        let source = memory("s", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0).reload_on_change())])
            .build()
            .await
            .unwrap();

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        let _sub = store.subscribe_with(move |event| {
            if *event == ChangeEvent::Completed {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        store.close()
                    } else {
                        store.shutdown().await
                    }
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_store_ignores_later_signals() {
        let source = memory("remote", &[]);
        let store = builder(&[(&source, SourceOptions::at_level(0).reload_on_change())])
            .build()
            .await
            .unwrap();
        let mut sub = store.subscribe();

        store.shutdown().await;
        source.inject("K", "v");
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(drain(&mut sub), vec![ChangeEvent::Completed]);
    }
}

mod transforms {
    use super::*;

    async fn encrypted_store(source: &Arc<MemorySource>) -> ConfigStore {
        builder(&[(source, SourceOptions::at_level(0).writeable())])
            .cipher(AesGcmCipher::from_passphrase("unit-test"))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sensitive_writes_are_encrypted_at_rest() {
        let source = memory("s", &[]);
        let store = encrypted_store(&source).await;

        store.set("Db:Password", "hunter22").unwrap();
        store.set("Db:Host", "localhost").unwrap();
        store.save(None).await.unwrap();

        let stored = source.stored("Db:Password").unwrap();
        assert!(stored.starts_with("ENC:"));
        assert!(!stored.contains("hunter22"));
        assert_eq!(source.stored("Db:Host").as_deref(), Some("localhost"));

        assert_eq!(store.get("Db:Password").unwrap().as_deref(), Some("hunter22"));
    }

    #[tokio::test]
    async fn tampered_ciphertext_surfaces_on_read() {
        let source = memory("s", &[("Secret", "ENC:bm90LXJlYWwtY2lwaGVydGV4dC1hdC1hbGw=")]);
        let store = encrypted_store(&source).await;

        let err = store.get("Secret").unwrap_err();
        assert!(matches!(err, ConfigError::Decryption { ref key, .. } if key == "Secret"));
        assert!(store.export_masked().is_err());
    }

    #[tokio::test]
    async fn masked_export_decrypts_then_masks() {
        let source = memory("s", &[("Name", "app")]);
        let store = encrypted_store(&source).await;
        store.set("ApiKey", "0123456789").unwrap();

        let exported = store.export_masked().unwrap();

        assert_eq!(exported["ApiKey"], "012***789");
        assert_eq!(exported["Name"], "app");
        assert_eq!(store.mask("Token", None), "[null]");
    }

    #[tokio::test]
    async fn typed_reads_fall_back_to_default() {
        let source = memory("s", &[("Port", "8080"), ("Bad", "eighty"), ("Flag", "on")]);
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .build()
            .await
            .unwrap();

        assert_eq!(store.get_value::<u16>("Port").unwrap(), 8080);
        assert_eq!(store.get_value::<u16>("Bad").unwrap(), 0);
        assert_eq!(store.get_value::<u16>("Missing").unwrap(), 0);
        assert_eq!(store.get_value_or::<u16>("Bad", 5).unwrap(), 5);
        assert!(store.get_value::<bool>("Flag").unwrap());

        let version = store.cache_version();
        assert_eq!(store.get_value::<u16>("Port").unwrap(), 8080);
        assert_eq!(store.cache_version(), version);

        store.set("Port", "9090").unwrap();
        assert!(store.cache_version() > version);
        assert_eq!(store.get_value::<u16>("Port").unwrap(), 9090);
    }
}

mod templates {
    use super::*;

    #[tokio::test]
    async fn resolved_reads_expand_references() {
        let source = memory(
            "s",
            &[
                ("Host", "db.local"),
                ("Port", "5432"),
                ("Url", "postgres://${Host}:${Port}"),
                ("Timeout", "${Port}"),
                ("Loop", "${Loop}"),
            ],
        );
        let store = builder(&[(&source, SourceOptions::at_level(0))]).build().await.unwrap();

        assert_eq!(
            store.get_resolved("Url").unwrap().as_deref(),
            Some("postgres://db.local:5432")
        );
        assert_eq!(store.get("Url").unwrap().as_deref(), Some("postgres://${Host}:${Port}"));
        assert_eq!(store.get_resolved_value::<u32>("Timeout").unwrap(), 5432);
        assert!(matches!(
            store.get_resolved("Loop"),
            Err(ConfigError::CircularReference { .. })
        ));
        assert_eq!(store.resolve_template("${Missing:Key}").unwrap(), "${Missing:Key}");
    }

    #[tokio::test]
    async fn references_see_decrypted_values() {
        let source = memory("s", &[("User", "sa")]);
        let store = builder(&[(&source, SourceOptions::at_level(0).writeable())])
            .cipher(AesGcmCipher::from_passphrase("k"))
            .build()
            .await
            .unwrap();

        store.set("Password", "p@ss").unwrap();
        store.set("Dsn", "${User}:${Password}").unwrap();

        assert_eq!(store.get_resolved("Dsn").unwrap().as_deref(), Some("sa:p@ss"));
    }

    #[tokio::test]
    async fn depth_limit_applies() {
        let source = memory("s", &[("A", "${B}"), ("B", "${C}"), ("C", "${D}"), ("D", "end")]);
        let store = builder(&[(&source, SourceOptions::at_level(0))])
            .template_options(TemplateOptions {
                max_recursion_depth: 1,
                ..TemplateOptions::default()
            })
            .build()
            .await
            .unwrap();

        assert_eq!(
            store.get_resolved("A"),
            Err(ConfigError::MaxRecursionExceeded { max_depth: 1 })
        );
        assert_eq!(store.get_resolved("B").unwrap().as_deref(), Some("end"));
    }
}

mod building {
    use super::*;

    #[tokio::test]
    async fn required_source_failure_aborts_build() {
        let source = memory("required", &[]);
        source.set_failing(true);

        let err = builder(&[(&source, SourceOptions::at_level(0))])
            .build()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::SourceLoad { ref name, .. } if name == "required"));
    }

    #[tokio::test]
    async fn optional_source_failure_is_tolerated() {
        let broken = memory("optional", &[]);
        broken.set_failing(true);
        let base = memory("base", &[("K", "v")]);

        let store = builder(&[
            (&base, SourceOptions::at_level(0)),
            (&broken, SourceOptions::at_level(1).optional()),
        ])
        .build()
        .await
        .unwrap();

        assert_eq!(store.get("K").unwrap().as_deref(), Some("v"));
        assert_eq!(store.sources().len(), 2);
        assert_eq!(store.source_values(1), Some(Default::default()));
    }
}
