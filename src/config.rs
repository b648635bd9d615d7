use std::time::Duration;

/// Game configuration shared by every client and the store host
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Global concurrent-user ceiling
    pub max_concurrent_users: i64,
    pub min_players: usize,
    pub max_players: usize,
    /// Finish-the-sentence answer limit (characters)
    pub sentence_max_chars: usize,
    /// No-context answer limit for non-emoji input (characters)
    pub context_max_chars: usize,
    pub drop_it_max_size_kb: usize,
    /// Drop It images are purged after this long
    pub drop_it_timeout: Duration,
    /// Interstitial every N rounds (0 disables)
    pub ad_frequency_rounds: u32,
    pub auto_hide_report_threshold: usize,
    pub room_inactivity: Duration,
    /// Per-player submission budget, measured from round creation
    pub submission_time: Duration,
    /// Guessing budget, measured from reveal
    pub guessing_time: Duration,
    /// Results display time, measured from results start
    pub results_time: Duration,
    /// Extra wait before a non-host takes over a host-driven transition
    pub fallback_margin: Duration,
    pub room_code_attempts: usize,
    pub display_name_min_chars: usize,
    pub display_name_max_chars: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_concurrent_users: 5000,
            min_players: 2,
            max_players: 12,
            sentence_max_chars: 60,
            context_max_chars: 30,
            drop_it_max_size_kb: 500,
            drop_it_timeout: Duration::from_secs(15 * 60),
            ad_frequency_rounds: 3,
            auto_hide_report_threshold: 3,
            room_inactivity: Duration::from_secs(24 * 60 * 60),
            submission_time: Duration::from_secs(15),
            guessing_time: Duration::from_secs(30),
            results_time: Duration::from_secs(15),
            fallback_margin: Duration::from_secs(5),
            room_code_attempts: 10,
            display_name_min_chars: 2,
            display_name_max_chars: 15,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unparseable {}={:?}", key, trimmed);
                None
            }
        }
    })
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

impl GameConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            max_concurrent_users: env_parse("SAYIT_MAX_CONCURRENT_USERS")
                .unwrap_or(defaults.max_concurrent_users),
            min_players: env_parse("SAYIT_MIN_PLAYERS").unwrap_or(defaults.min_players),
            max_players: env_parse("SAYIT_MAX_PLAYERS").unwrap_or(defaults.max_players),
            sentence_max_chars: env_parse("SAYIT_SENTENCE_MAX_CHARS")
                .unwrap_or(defaults.sentence_max_chars),
            context_max_chars: env_parse("SAYIT_CONTEXT_MAX_CHARS")
                .unwrap_or(defaults.context_max_chars),
            drop_it_max_size_kb: env_parse("SAYIT_DROP_IT_MAX_SIZE_KB")
                .unwrap_or(defaults.drop_it_max_size_kb),
            drop_it_timeout: env_parse::<u64>("SAYIT_DROP_IT_TIMEOUT_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.drop_it_timeout),
            ad_frequency_rounds: env_parse("SAYIT_AD_FREQUENCY_ROUNDS")
                .unwrap_or(defaults.ad_frequency_rounds),
            auto_hide_report_threshold: env_parse("SAYIT_AUTO_HIDE_REPORT_THRESHOLD")
                .unwrap_or(defaults.auto_hide_report_threshold),
            room_inactivity: env_parse::<u64>("SAYIT_ROOM_INACTIVITY_HOURS")
                .map(|h| Duration::from_secs(h * 60 * 60))
                .unwrap_or(defaults.room_inactivity),
            submission_time: env_secs("SAYIT_SUBMISSION_SECONDS")
                .unwrap_or(defaults.submission_time),
            guessing_time: env_secs("SAYIT_GUESSING_SECONDS").unwrap_or(defaults.guessing_time),
            results_time: env_secs("SAYIT_RESULTS_SECONDS").unwrap_or(defaults.results_time),
            fallback_margin: env_secs("SAYIT_FALLBACK_MARGIN_SECONDS")
                .unwrap_or(defaults.fallback_margin),
            room_code_attempts: defaults.room_code_attempts,
            display_name_min_chars: defaults.display_name_min_chars,
            display_name_max_chars: defaults.display_name_max_chars,
        };

        if config.min_players > config.max_players {
            tracing::warn!(
                "SAYIT_MIN_PLAYERS ({}) exceeds SAYIT_MAX_PLAYERS ({}), using defaults",
                config.min_players,
                config.max_players
            );
            return Self {
                min_players: defaults.min_players,
                max_players: defaults.max_players,
                ..config
            };
        }

        config
    }

    /// Whether an interstitial is due after `rounds_played` rounds
    pub fn interstitial_due(&self, rounds_played: u32) -> bool {
        self.ad_frequency_rounds > 0
            && rounds_played > 0
            && rounds_played % self.ad_frequency_rounds == 0
    }

    /// Active-user count at which capacity is considered nearly exhausted
    pub fn capacity_warning_threshold(&self) -> i64 {
        self.max_concurrent_users * 9 / 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "SAYIT_MAX_PLAYERS",
            "SAYIT_MIN_PLAYERS",
            "SAYIT_GUESSING_SECONDS",
            "SAYIT_DROP_IT_TIMEOUT_MINUTES",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = GameConfig::default();
        assert_eq!(config.max_concurrent_users, 5000);
        assert_eq!(config.min_players, 2);
        assert_eq!(config.max_players, 12);
        assert_eq!(config.sentence_max_chars, 60);
        assert_eq!(config.guessing_time, Duration::from_secs(30));
        assert_eq!(config.results_time, Duration::from_secs(15));
        assert_eq!(config.auto_hide_report_threshold, 3);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("SAYIT_MAX_PLAYERS", "8");
        std::env::set_var("SAYIT_GUESSING_SECONDS", " 45 ");
        std::env::set_var("SAYIT_DROP_IT_TIMEOUT_MINUTES", "5");

        let config = GameConfig::from_env();
        assert_eq!(config.max_players, 8);
        assert_eq!(config.guessing_time, Duration::from_secs(45));
        assert_eq!(config.drop_it_timeout, Duration::from_secs(300));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage_and_inverted_bounds() {
        clear_env();
        std::env::set_var("SAYIT_GUESSING_SECONDS", "soon");
        std::env::set_var("SAYIT_MIN_PLAYERS", "20");
        std::env::set_var("SAYIT_MAX_PLAYERS", "4");

        let config = GameConfig::from_env();
        assert_eq!(config.guessing_time, Duration::from_secs(30));
        assert_eq!(config.min_players, 2);
        assert_eq!(config.max_players, 12);
        clear_env();
    }

    #[test]
    fn test_interstitial_due() {
        let config = GameConfig::default();
        assert!(!config.interstitial_due(0));
        assert!(!config.interstitial_due(2));
        assert!(config.interstitial_due(3));
        assert!(config.interstitial_due(6));

        let disabled = GameConfig {
            ad_frequency_rounds: 0,
            ..GameConfig::default()
        };
        assert!(!disabled.interstitial_due(3));
    }
}
