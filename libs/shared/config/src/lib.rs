use std::env;
use tracing::warn;

const DEFAULT_TASK_POOL_SIZE: usize = 50;
const DEFAULT_SERVER_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub task_pool_size: usize,
    pub notifier_webhook_url: Option<String>,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            task_pool_size: DEFAULT_TASK_POOL_SIZE,
            notifier_webhook_url: None,
            server_port: DEFAULT_SERVER_PORT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using in-memory stores");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            task_pool_size: parse_var("TASK_POOL_SIZE", DEFAULT_TASK_POOL_SIZE),
            notifier_webhook_url: env::var("NOTIFIER_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.is_empty())
                .or_else(|| {
                    warn!("NOTIFIER_WEBHOOK_URL not set, reminders will only be logged");
                    None
                }),
            server_port: parse_var("SERVER_PORT", DEFAULT_SERVER_PORT),
        };

        if !config.is_database_configured() {
            warn!("Database not configured - scheduling state will not survive a restart");
        }

        config
    }

    pub fn is_database_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}
