use crate::registry::{DuplicatePolicy, WatcherSettings};
use crate::types::Address;
use crate::watcher::{PollSchedule, DEFAULT_POLL_BASE_MS, DEFAULT_POLL_JITTER_MS};
use anyhow::{Context, Result};
use log::info;
use std::env;
use std::time::Duration;

fn get_env(key: &str, default: &str) -> Result<String> {
    Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("{} must be an unsigned integer", key))
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("{} must be an unsigned integer", key))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc: RpcConfig,
    pub polling: PollingConfig,
    pub telegram: TelegramConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub timeout_secs: u64, // 0 = transport default (no timeout)
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub base_ms: u64,
    pub jitter_ms: u64,
    pub seen_capacity: usize, // 0 = unbounded
    pub duplicate_policy: String,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_url: String,
    pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub addresses: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Self {
            rpc: RpcConfig {
                url: get_env("SOLANA_RPC_URL", "https://api.mainnet-beta.solana.com")?,
                timeout_secs: get_env_u64("RPC_TIMEOUT_SECS", 0)?,
            },
            polling: PollingConfig {
                base_ms: get_env_u64("POLL_BASE_MS", DEFAULT_POLL_BASE_MS)?,
                jitter_ms: get_env_u64("POLL_JITTER_MS", DEFAULT_POLL_JITTER_MS)?,
                seen_capacity: get_env_usize("SEEN_CAPACITY", 0)?,
                duplicate_policy: get_env("DUPLICATE_WATCHERS", "spawn")?,
            },
            telegram: TelegramConfig {
                bot_token: get_env("TELEGRAM_BOT_TOKEN", "")?,
                api_url: get_env("TELEGRAM_API_URL", crate::notifier::TELEGRAM_API_URL)?,
                chat_id: get_env("TELEGRAM_CHAT_ID", "")?,
            },
            watch: WatchConfig {
                addresses: split_list(&get_env("WATCH_ADDRESSES", "")?),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc.url.is_empty() {
            anyhow::bail!("SOLANA_RPC_URL must not be empty");
        }

        if self.polling.base_ms == 0 {
            anyhow::bail!("POLL_BASE_MS must be > 0");
        }

        self.duplicate_policy()?;
        self.watch_addresses()?;

        if !self.watch.addresses.is_empty() && self.telegram.chat_id.is_empty() {
            anyhow::bail!("TELEGRAM_CHAT_ID is required when WATCH_ADDRESSES is set");
        }

        Ok(())
    }

    pub fn duplicate_policy(&self) -> Result<DuplicatePolicy> {
        self.polling
            .duplicate_policy
            .parse()
            .context("Invalid DUPLICATE_WATCHERS")
    }

    pub fn watch_addresses(&self) -> Result<Vec<Address>> {
        self.watch
            .addresses
            .iter()
            .map(|a| a.parse::<Address>().context("Invalid entry in WATCH_ADDRESSES"))
            .collect()
    }

    pub fn rpc_timeout(&self) -> Option<Duration> {
        match self.rpc.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn watcher_settings(&self) -> Result<WatcherSettings> {
        Ok(WatcherSettings {
            schedule: PollSchedule::new(self.polling.base_ms, self.polling.jitter_ms),
            seen_capacity: self.polling.seen_capacity,
            duplicate_policy: self.duplicate_policy()?,
        })
    }

    pub fn print_startup_info(&self) {
        info!("👀 SOLANA TRANSFER WATCHER");
        info!("⏰ {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📡 RPC: {}", self.rpc.url);
        match self.rpc_timeout() {
            Some(timeout) => info!("⏳ RPC timeout: {}s", timeout.as_secs()),
            None => info!("⏳ RPC timeout: transport default"),
        }
        info!(
            "⏱️  Poll interval: {}ms + up to {}ms jitter",
            self.polling.base_ms, self.polling.jitter_ms
        );
        match self.polling.seen_capacity {
            0 => info!("🧠 Seen signatures: unbounded"),
            cap => info!("🧠 Seen signatures: last {}", cap),
        }
        info!("👥 Duplicate watchers: {}", self.polling.duplicate_policy);
        if self.telegram.bot_token.is_empty() {
            info!("📱 Telegram: disabled (notifications go to the log)");
        } else {
            info!("📱 Telegram: enabled ({})", self.telegram.api_url);
        }
        info!("🎯 Watching {} address(es)", self.watch.addresses.len());
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
