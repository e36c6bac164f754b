use autologin_lib::{
    auth::{HashAlgorithm, PasswordAlgorithm},
    Settings,
};
use figment::Jail;
use std::path::PathBuf;

#[test]
fn test_toml_file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "autologin.toml",
            r#"
                identification = "email"
                log_level = "debug"

                [cookie]
                name = "remember"
                max_age_secs = 86400
                secure = true

                [token]
                hash_algorithm = "sha512"
                purge_on_login = false

                [password]
                algorithm = "scrypt"

                [storage]
                path = "/var/lib/autologin"
            "#,
        )?;

        let settings = Settings::load_from("autologin.toml").expect("valid config");
        assert_eq!(settings.identification, "email");
        assert_eq!(settings.cookie.name, "remember");
        assert_eq!(settings.cookie.max_age_secs, 86400);
        assert!(settings.cookie.secure);
        assert!(settings.cookie.encrypt);
        assert_eq!(settings.token.hash_algorithm, HashAlgorithm::Sha512);
        assert!(!settings.token.purge_on_login);
        assert!(settings.token.clean_on_login);
        assert_eq!(settings.password.algorithm, PasswordAlgorithm::Scrypt);
        assert_eq!(
            settings.token_store_path(),
            PathBuf::from("/var/lib/autologin/autologin_tokens.json")
        );
        Ok(())
    });
}

#[test]
fn test_environment_beats_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[server]\nport = 8080\n")?;
        jail.set_env("AUTOLOGIN_SERVER__PORT", "9090");
        jail.set_env("AUTOLOGIN_TOKEN__BYTES", "48");
        jail.set_env("AUTOLOGIN_IDENTIFICATION", "email");

        let settings = Settings::load().expect("valid config");
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.token.bytes, 48);
        assert_eq!(settings.identification, "email");
        Ok(())
    });
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[token]\nbytes = 4\n")?;
        assert!(Settings::load().is_err());

        jail.create_file("config.toml", "[token]\nhash_algorithm = \"md5\"\n")?;
        assert!(Settings::load().is_err());

        jail.create_file("config.toml", "[cookie]\nname = \"\"\n")?;
        assert!(Settings::load().is_err());
        Ok(())
    });
}
