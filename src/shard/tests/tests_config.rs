//! Shard configuration validation tests.

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use crate::StoreError;
    use crate::shard::{Shard, ShardConfig, ShardSchema};
    use crate::test_helpers::init_tracing;
    use tempfile::TempDir;

    fn rejected(config: ShardConfig) -> String {
        match config.validate() {
            Err(StoreError::InvalidConfig(msg)) => msg,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn default__is_valid() {
        assert!(ShardConfig::default().validate().is_ok());
    }

    /// # Scenario
    /// Each parameter set just outside its range.
    ///
    /// # Expected behavior
    /// Validation names the offending parameter.
    #[test]
    fn validate__rejects_out_of_range() {
        let base = ShardConfig::default;

        let msg = rejected(ShardConfig {
            max_store_size: 1024,
            ..base()
        });
        assert!(msg.contains("max_store_size"));

        let msg = rejected(ShardConfig {
            max_readers: 0,
            ..base()
        });
        assert!(msg.contains("max_readers"));

        let msg = rejected(ShardConfig {
            buffer_capacity: 8,
            ..base()
        });
        assert!(msg.contains("buffer_capacity"));

        let msg = rejected(ShardConfig {
            pooled_buffers: 0,
            ..base()
        });
        assert!(msg.contains("pooled_buffers"));
    }

    /// # Scenario
    /// Open a shard with an invalid configuration.
    ///
    /// # Expected behavior
    /// `open` fails before touching the directory.
    #[test]
    fn open__invalid_config_creates_nothing() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("never");

        let result = Shard::open(
            &path,
            ShardSchema::default(),
            ShardConfig {
                pooled_buffers: 0,
                ..ShardConfig::default()
            },
        );
        assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
        assert!(!path.exists());
    }
}
