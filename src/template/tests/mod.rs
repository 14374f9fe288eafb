use std::collections::HashMap;

use super::*;

fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn resolver() -> TemplateResolver {
    TemplateResolver::default()
}

#[test]
fn plain_text_is_unchanged() {
    let lookup = values(&[]);
    assert_eq!(resolver().resolve("no tokens here", &lookup).unwrap(), "no tokens here");
}

#[test]
fn self_references_resolve_and_chain() {
    let lookup = values(&[
        ("Host", "db.local"),
        ("Port", "5432"),
        ("Url", "postgres://${Host}:${Port}"),
        ("Dsn", "${Url}/app"),
    ]);

    assert_eq!(
        resolver().resolve("dsn=${Dsn}", &lookup).unwrap(),
        "dsn=postgres://db.local:5432/app"
    );
}

#[test]
fn hierarchical_keys_are_looked_up_whole() {
    let lookup = values(&[("Database:Host", "primary")]);
    assert_eq!(resolver().resolve("${Database:Host}", &lookup).unwrap(), "primary");
}

#[test]
fn unresolved_token_is_kept_verbatim() {
    let lookup = values(&[]);

    assert_eq!(resolver().resolve("a ${X:Y} b", &lookup).unwrap(), "a ${X:Y} b");
    assert_eq!(resolver().resolve("${Missing}", &lookup).unwrap(), "${Missing}");
}

#[test]
fn unresolved_token_can_be_dropped() {
    let options = TemplateOptions {
        keep_unresolved: false,
        ..TemplateOptions::default()
    };
    let lookup = values(&[]);

    assert_eq!(TemplateResolver::new(options).resolve("a${Missing}b", &lookup).unwrap(), "ab");
}

#[test]
fn unterminated_token_is_literal() {
    let lookup = values(&[("A", "1")]);
    assert_eq!(resolver().resolve("${A} ${A", &lookup).unwrap(), "1 ${A");
}

#[test]
fn direct_self_reference_is_circular() {
    let lookup = values(&[("A", "${A}")]);

    let err = resolver().resolve("${A}", &lookup).unwrap_err();
    assert_eq!(
        err,
        ConfigError::CircularReference {
            chain: "A -> A".to_string()
        }
    );
}

#[test]
fn indirect_cycle_is_circular() {
    let lookup = values(&[("A", "x${B}"), ("B", "${C}"), ("C", "${A}")]);

    let err = resolver().resolve("${A}", &lookup).unwrap_err();
    assert_eq!(
        err,
        ConfigError::CircularReference {
            chain: "A -> B -> C -> A".to_string()
        }
    );
}

#[test]
fn repeated_reference_is_not_a_cycle() {
    let lookup = values(&[("A", "a"), ("B", "${A}${A}")]);
    assert_eq!(resolver().resolve("${B}-${A}", &lookup).unwrap(), "aa-a");
}

fn chain(n: usize) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = (1..n)
        .map(|i| (format!("K{i}"), format!("${{K{}}}", i + 1)))
        .collect();
    map.insert(format!("K{n}"), "end".to_string());
    map
}

#[test]
fn chain_deeper_than_limit_fails() {
    let n = 8;
    let options = TemplateOptions {
        max_recursion_depth: n - 2,
        ..TemplateOptions::default()
    };

    let err = TemplateResolver::new(options)
        .resolve("${K1}", &chain(n))
        .unwrap_err();
    assert_eq!(err, ConfigError::MaxRecursionExceeded { max_depth: n - 2 });
}

#[test]
fn chain_within_limit_resolves() {
    let n = 8;
    let options = TemplateOptions {
        max_recursion_depth: n - 1,
        ..TemplateOptions::default()
    };

    assert_eq!(
        TemplateResolver::new(options).resolve("${K1}", &chain(n)).unwrap(),
        "end"
    );
}

#[test]
#[allow(unsafe_code)]
fn env_namespace_reads_environment() {
    unsafe {
        std::env::set_var("CONFSTACK_TEMPLATE_TEST", "from-env");
    }
    let lookup = values(&[]);

    assert_eq!(
        resolver().resolve("${ENV:CONFSTACK_TEMPLATE_TEST}", &lookup).unwrap(),
        "from-env"
    );
    assert_eq!(
        resolver().resolve("${env:CONFSTACK_TEMPLATE_TEST}", &lookup).unwrap(),
        "from-env"
    );
}

#[test]
fn sys_namespace_exposes_properties() {
    let lookup = values(&[]);
    let resolved = resolver().resolve("${SYS:Is64Bit}", &lookup).unwrap();

    assert!(resolved == "true" || resolved == "false");
    assert_eq!(
        resolver().resolve("${SYS:NoSuchProperty}", &lookup).unwrap(),
        "${SYS:NoSuchProperty}"
    );
}

#[test]
fn bare_resolver_treats_namespaces_as_keys() {
    let lookup = values(&[("ENV:HOME", "configured")]);

    assert_eq!(
        TemplateResolver::bare(TemplateOptions::default())
            .resolve("${ENV:HOME}", &lookup)
            .unwrap(),
        "configured"
    );
}

#[test]
fn custom_delimiters() {
    let options = TemplateOptions {
        prefix: "{{".to_string(),
        suffix: "}}".to_string(),
        ..TemplateOptions::default()
    };
    let lookup = values(&[("Name", "world")]);

    assert_eq!(
        TemplateResolver::new(options).resolve("hello {{Name}} ${Name}", &lookup).unwrap(),
        "hello world ${Name}"
    );
}

struct Failing;

impl ValueLookup for Failing {
    fn lookup(&self, key: &str) -> crate::core::Result<Option<String>> {
        Err(ConfigError::Decryption {
            key: key.to_string(),
            details: "bad".to_string(),
        })
    }
}

#[test]
fn lookup_errors_propagate() {
    let err = resolver().resolve("${Secret}", &Failing).unwrap_err();
    assert!(matches!(err, ConfigError::Decryption { .. }));
}
