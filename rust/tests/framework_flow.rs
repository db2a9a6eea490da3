use std::fs;

use sealed_conf::config::seal;
use sealed_conf::locators::{LocatorError, Missing};
use sealed_conf::settings::{ENV_DATA, ENV_KEY, ENV_LOCATORS, ENV_PLATFORM};
use sealed_conf::{ConfigDocument, FrameworkProperties, LocatorEntry, Platform, SecretCipher, StrategyKind};
use tempfile::tempdir;

#[test]
fn properties_wire_resolver_and_locators() {
    let dir = tempdir().expect("tempdir");
    let key = SecretCipher::generate_key();
    let encoded_key = key.encode();
    let cipher = SecretCipher::new(key);

    let data = format!(
        "login_test:\n  username: test_user\n  password: \"{}\"\n  settings:\n    timeout: 30\n    api_key: \"{}\"\nsearch_test:\n  query: test query\n",
        seal(&cipher, "s3cr3t!").expect("seal"),
        seal(&cipher, "api-key-value").expect("seal"),
    );
    fs::write(dir.path().join("test_data.yml"), data).expect("write data");
    fs::create_dir(dir.path().join("ui")).expect("mkdir");
    fs::write(
        dir.path().join("ui").join("locators_android.yml"),
        "login_screen:\n  username:\n    type: ID\n    value: username_field\n  password:\n    type: xpath\n    value: //input[@type='password']\n",
    )
    .expect("write locators");

    let mut properties = FrameworkProperties::default();
    properties
        .apply_env(|name| match name {
            ENV_KEY => Some(encoded_key.clone()),
            ENV_DATA => Some(dir.path().join("test_data.yml").to_string_lossy().into_owned()),
            ENV_LOCATORS => Some(dir.path().join("ui").to_string_lossy().into_owned()),
            ENV_PLATFORM => Some("android".to_string()),
            _ => None,
        })
        .expect("apply env");

    let resolver = properties.data_resolver().expect("resolver");
    let login = resolver.get_section("login_test");
    assert_eq!(login.get("password").and_then(ConfigDocument::as_str), Some("s3cr3t!"));
    assert_eq!(
        login
            .get("settings")
            .and_then(|s| s.get("api_key"))
            .and_then(ConfigDocument::as_str),
        Some("api-key-value")
    );
    assert!(resolver.get_section("checkout_test").is_empty_mapping());

    let mut store = properties.locator_store();
    assert_eq!(store.scope(), Platform::Android);
    assert_eq!(
        store.get_entry("login_screen", "username").expect("entry"),
        LocatorEntry::new(StrategyKind::Id, "username_field")
    );
    assert!(matches!(
        store.get_entry("login_screen", "submit"),
        Err(LocatorError::LocatorNotFound { missing: Missing::Element, .. })
    ));
    assert!(matches!(
        store.get_screen("settings_screen"),
        Err(LocatorError::ScreenNotFound { .. })
    ));
}

#[test]
fn resolver_with_foreign_secret_does_not_construct() {
    let dir = tempdir().expect("tempdir");
    let foreign = SecretCipher::new(SecretCipher::generate_key());
    fs::write(
        dir.path().join("test_data.yml"),
        format!("login_test:\n  password: \"{}\"\n", seal(&foreign, "x").expect("seal")),
    )
    .expect("write");

    let properties = FrameworkProperties {
        encryption_key: Some(SecretCipher::generate_key().encode()),
        test_data_file: dir.path().join("test_data.yml"),
        ..FrameworkProperties::default()
    };
    let err = properties.data_resolver().unwrap_err();
    assert!(err.to_string().contains("$.login_test.password"));
}
