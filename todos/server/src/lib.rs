pub mod config {
    use serde::Deserialize;

    use crate::todo::api::DEFAULT_PAGE_SIZE;

    #[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
    pub struct Config {
        /// PostgreSQL URL. Todos are kept in memory when unset.
        #[serde(default)]
        pub db_url: Option<String>,
        #[serde(default = "default_port")]
        pub port: u16,
        #[serde(default = "default_page_size")]
        pub page_size: u64,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_settings(config::Environment::default())
        }

        fn from_settings<S>(source: S) -> anyhow::Result<Self>
        where
            S: config::Source + Send + Sync + 'static,
        {
            let settings = config::Config::builder().add_source(source).build()?;

            let config: Config = settings.try_deserialize()?;
            if config.page_size == 0 {
                anyhow::bail!("PAGE_SIZE must be at least 1");
            }
            Ok(config)
        }
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_page_size() -> u64 {
        DEFAULT_PAGE_SIZE
    }

}
pub mod entities;
pub mod snapshot;
pub mod todo;
pub mod web;
