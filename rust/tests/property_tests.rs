use std::sync::Arc;

use proptest::prelude::*;
use sealed_conf::config::{materialize, seal};
use sealed_conf::events::NoopEvents;
use sealed_conf::{ConfigDocument, ConfigResolver, Scalar, SecretCipher};

fn cipher() -> SecretCipher {
    SecretCipher::new(SecretCipher::generate_key())
}

/// Scalars that can never be mistaken for an `ENC[...]` marker, including
/// near misses such as an unterminated or lowercase prefix.
fn plain_scalar() -> impl Strategy<Value = ConfigDocument> {
    prop_oneof![
        Just(Scalar::Null),
        any::<bool>().prop_map(Scalar::Bool),
        any::<i64>().prop_map(Scalar::Integer),
        (-1.0e9f64..1.0e9f64).prop_map(Scalar::Float),
        "[a-zA-Z0-9 _./:-]{0,24}".prop_map(Scalar::String),
        "ENC\\[[A-Za-z0-9=_-]{0,12}".prop_map(Scalar::String),
        "enc\\[[a-z]{0,8}\\]".prop_map(Scalar::String),
    ]
    .prop_map(ConfigDocument::Scalar)
}

fn plain_document() -> impl Strategy<Value = ConfigDocument> {
    plain_scalar().prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(ConfigDocument::Sequence),
            prop::collection::btree_map("[a-z_]{1,10}", inner, 0..6).prop_map(ConfigDocument::Mapping),
        ]
    })
}

proptest! {
    #[test]
    fn decrypt_inverts_encrypt(plaintext in any::<String>()) {
        let cipher = cipher();
        let token = cipher.encrypt(&plaintext).expect("encrypt");
        prop_assert_eq!(cipher.decrypt(&token).expect("decrypt"), plaintext);
    }

    #[test]
    fn documents_without_markers_materialize_unchanged(doc in plain_document()) {
        let resolved = materialize(&cipher(), &doc, &NoopEvents).expect("materialize");
        prop_assert_eq!(resolved, doc);
    }

    #[test]
    fn resolver_exposes_marker_free_documents_verbatim(doc in plain_document()) {
        let resolver = ConfigResolver::from_document(&cipher(), "generated.yml", &doc, Arc::new(NoopEvents))
            .expect("resolver");
        prop_assert_eq!(resolver.get_all(), &doc);
    }

    #[test]
    fn sealed_leaf_materializes_to_its_plaintext(plaintext in any::<String>(), section in "[a-z_]{1,10}") {
        let cipher = cipher();
        let sealed = seal(&cipher, &plaintext).expect("seal");
        let inner: ConfigDocument = [("secret", ConfigDocument::from(sealed))].into_iter().collect();
        let doc: ConfigDocument = [(section.clone(), inner)].into_iter().collect();

        let resolved = materialize(&cipher, &doc, &NoopEvents).expect("materialize");
        let secret = resolved.get(&section).and_then(|s| s.get("secret")).and_then(ConfigDocument::as_str);
        prop_assert_eq!(secret, Some(plaintext.as_str()));
    }
}
