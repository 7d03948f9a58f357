use proptest::prelude::*;
use raiden_engine::config::Config;
use raiden_engine::memory::{ConversationStore, MessageRecord, MemoryStats};
use raiden_engine::mode::Mode;
use raiden_engine::trigger::{FixedRandom, TriggerEngine};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

// Bounded log: after any sequence of appends the log holds the most recent
// min(n, max) records in arrival order.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_log_is_bounded_fifo(max in 1usize..=40, count in 0usize..=80) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path(), max).unwrap();

        let log = runtime().block_on(async {
            for id in 0..count {
                let len = store
                    .append("g", MessageRecord::new("u", "m", id as i64))
                    .await;
                assert!(len <= max);
            }
            store.read("g", None).await
        });

        let expected: Vec<i64> = (count.saturating_sub(max)..count).map(|i| i as i64).collect();
        let actual: Vec<i64> = log.iter().map(|r| r.message_id).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn test_read_returns_suffix(count in 0usize..=30, limit in 0usize..=40) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path(), 30).unwrap();

        let (all, limited) = runtime().block_on(async {
            for id in 0..count {
                store
                    .append("g", MessageRecord::new("u", "m", id as i64))
                    .await;
            }
            (store.read("g", None).await, store.read("g", Some(limit)).await)
        });

        if limit == 0 {
            prop_assert_eq!(&limited, &all);
        } else {
            prop_assert!(limited.len() <= limit);
            prop_assert_eq!(limited.len(), all.len().min(limit));
            prop_assert_eq!(&limited[..], &all[all.len() - limited.len()..]);
        }
    }

    #[test]
    fn test_mentions_always_trigger(
        prefix in "[a-z ]{0,10}",
        suffix in "[a-z ]{0,10}",
        name in "(?i)raiden|ei",
        draw in 0.0..1.0f64,
        assistant in any::<bool>(),
    ) {
        let mode = if assistant { Mode::Assistant } else { Mode::Persona };
        let engine = TriggerEngine::new(Box::new(FixedRandom(draw)));
        let text = format!("{}{}{}", prefix, name, suffix);

        prop_assert!(engine.should_respond(&text, false, mode).responds());
    }

    #[test]
    fn test_assistant_needs_engagement(text in "[0-9 .,!?]{0,30}", draw in 0.0..1.0f64) {
        let engine = TriggerEngine::new(Box::new(FixedRandom(draw)));
        prop_assert!(!engine.should_respond(&text, false, Mode::Assistant).responds());
        prop_assert!(engine.should_respond(&text, true, Mode::Assistant).responds());
    }

    #[test]
    fn test_usage_percent_bounds(max in 1usize..=1000, fill in 0usize..=1000) {
        let total = fill.min(max);
        let stats = MemoryStats::new(total, max);
        prop_assert!(stats.memory_usage_percent >= 0.0);
        prop_assert!(stats.memory_usage_percent <= 100.0);
        // two decimal places
        let scaled = stats.memory_usage_percent * 100.0;
        prop_assert!((scaled - scaled.round()).abs() < 1e-6);
    }

    #[test]
    fn test_config_parsing_round_trip(
        log_level in "error|warn|info|debug|trace",
        max_messages in 1usize..=500,
        timeout_secs in 1u64..=300,
        enabled in any::<bool>(),
    ) {
        let mut config = Config::default_config();
        config.core.log_level = log_level.clone();
        config.memory.max_messages = max_messages;
        config.llm.timeout_secs = timeout_secs;
        config.access.enabled = enabled;

        let serialized = toml::to_string(&config).expect("Failed to serialize config");
        let parsed = Config::from_toml_str(&serialized).expect("Failed to parse config");

        prop_assert_eq!(parsed.core.log_level, log_level);
        prop_assert_eq!(parsed.memory.max_messages, max_messages);
        prop_assert_eq!(parsed.llm.timeout_secs, timeout_secs);
        prop_assert_eq!(parsed.access.enabled, enabled);
    }
}
