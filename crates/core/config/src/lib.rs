use cached::proc_macro::cached;
use config::{Config, File, FileFormat};
use futures_locks::RwLock;
use once_cell::sync::Lazy;
use serde::Deserialize;

static CONFIG_BUILDER: Lazy<RwLock<Config>> = Lazy::new(|| {
    RwLock::new({
        let mut builder = Config::builder().add_source(File::from_str(
            include_str!("../Wayfarer.toml"),
            FileFormat::Toml,
        ));

        if std::path::Path::new("Wayfarer.toml").exists() {
            builder = builder.add_source(File::new("Wayfarer.toml", FileFormat::Toml));
        }

        builder.build().unwrap()
    })
});

#[derive(Deserialize, Debug, Clone)]
pub struct Feed {
    /// Number of most recent items kept live per feed
    pub window_size: usize,
    /// Number of items fetched by one backfill page
    pub page_size: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FeaturesLimits {
    pub message_length: usize,
    pub preview_length: usize,
    pub conversation_size: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Features {
    pub limits: FeaturesLimits,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Presence {
    pub typing_debounce_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub feed: Feed,
    pub features: Features,
    pub presence: Presence,
}

pub async fn init() {
    println!(
        ":: Wayfarer Configuration ::\n\x1b[32m{:?}\x1b[0m",
        config().await
    );
}

pub async fn read() -> Config {
    CONFIG_BUILDER.read().await.clone()
}

#[cached(time = 30)]
pub async fn config() -> Settings {
    read().await.try_deserialize::<Settings>().unwrap()
}

#[cfg(test)]
mod tests {
    use crate::config;

    #[tokio::test]
    async fn defaults_deserialize() {
        let settings = config().await;
        assert!(settings.feed.window_size > 0);
        assert_eq!(settings.feed.window_size, settings.feed.page_size);
        assert!(settings.features.limits.preview_length < settings.features.limits.message_length);
    }
}
