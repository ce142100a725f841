//! Hash lookup table tests.

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use crate::StoreError;
    use crate::lookup::{HASH_LOOKUP_DB, HashWidth, Lookups};
    use crate::test_helpers::temp_env;

    /// # Scenario
    /// Hash the same input at both widths.
    ///
    /// # Expected behavior
    /// Widths are 4 and 8 bytes; the integer hash folds the long one.
    #[test]
    fn width__sizes_and_folding() {
        let long = HashWidth::Long.hash(b"planb");
        let int = HashWidth::Integer.hash(b"planb");
        assert_eq!(long.len(), 8);
        assert_eq!(int.len(), 4);

        let folded: Vec<u8> = long[..4]
            .iter()
            .zip(&long[4..])
            .map(|(hi, lo)| hi ^ lo)
            .collect();
        assert_eq!(int, folded);

        for width in HashWidth::ALL {
            assert_eq!(HashWidth::from_tag(width.tag()).unwrap(), width);
        }
        assert!(HashWidth::from_tag(2).is_err());
    }

    /// # Scenario
    /// Intern a value, then intern it again.
    ///
    /// # Expected behavior
    /// The key is the bare hash both times and the value is retrievable.
    #[test]
    fn get_or_create__same_value_same_key() {
        let (_dir, env) = temp_env();
        let hash = Lookups::open(&env, HashWidth::Long).unwrap().hash;

        let first = env.write(|w| hash.get_or_create(w, b"alpha")).unwrap();
        let second = env.write(|w| hash.get_or_create(w, b"alpha")).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, HashWidth::Long.hash(b"alpha"));
        env.read(|txn| {
            assert_eq!(hash.get_value(txn, &first)?, b"alpha");
            assert_eq!(hash.len(txn)?, 1);
            Ok(())
        })
        .unwrap();
    }

    /// # Scenario
    /// Intern a value far longer than the engine's key limit.
    ///
    /// # Expected behavior
    /// It is accepted: only its hash is used as a key.
    #[test]
    fn get_or_create__accepts_long_values() {
        let (_dir, env) = temp_env();
        let hash = Lookups::open(&env, HashWidth::Integer).unwrap().hash;
        let value = vec![b'x'; 10_000];

        let key = env.write(|w| hash.get_or_create(w, &value)).unwrap();
        assert_eq!(key.len(), 4);
        let stored = env
            .read(|txn| Ok(hash.get_value(txn, &key)?.to_vec()))
            .unwrap();
        assert_eq!(stored, value);
    }

    /// # Scenario
    /// `find` for an interned and a missing value.
    ///
    /// # Expected behavior
    /// The interned value yields its key; the missing one yields `None`
    /// and no entry is created.
    #[test]
    fn find__never_creates() {
        let (_dir, env) = temp_env();
        let hash = Lookups::open(&env, HashWidth::Long).unwrap().hash;
        let key = env.write(|w| hash.get_or_create(w, b"present")).unwrap();

        env.read(|txn| {
            assert_eq!(hash.find(txn, b"present")?, Some(key.clone()));
            assert_eq!(hash.find(txn, b"absent")?, None);
            assert_eq!(hash.len(txn)?, 1);
            Ok(())
        })
        .unwrap();
    }

    /// # Scenario
    /// Delete an entry, then read it.
    ///
    /// # Expected behavior
    /// The read reports `LookupNotFound` with the hex key.
    #[test]
    fn delete__then_get_value_not_found() {
        let (_dir, env) = temp_env();
        let hash = Lookups::open(&env, HashWidth::Integer).unwrap().hash;
        let key = env.write(|w| hash.get_or_create(w, b"short-lived")).unwrap();

        assert!(env.write(|w| hash.delete(w.txn_mut(), &key)).unwrap());
        assert!(!env.write(|w| hash.delete(w.txn_mut(), &key)).unwrap());

        let err = env
            .read(|txn| hash.get_value(txn, &key).map(<[u8]>::to_vec))
            .unwrap_err();
        assert!(matches!(err, StoreError::LookupNotFound { table: "hash", .. }));
    }

    /// # Scenario
    /// Every slot of a bucket is occupied by a different value.
    ///
    /// # Expected behavior
    /// Interning a new value into that bucket fails with
    /// `ClashResolution` and the transaction is rolled back.
    #[test]
    fn get_or_create__full_bucket_fails() {
        let (_dir, env) = temp_env();
        let hash = Lookups::open(&env, HashWidth::Integer).unwrap().hash;
        let raw = env.create_database(HASH_LOOKUP_DB).unwrap();
        let bucket = HashWidth::Integer.hash(b"target");

        env.write(|w| {
            raw.put(w.txn_mut(), &bucket, b"filler-0")?;
            for slot in 1..=255u8 {
                let mut key = bucket.clone();
                key.push(slot);
                raw.put(w.txn_mut(), &key, format!("filler-{slot}").as_bytes())?;
            }
            Ok(())
        })
        .unwrap();

        let err = env
            .write(|w| {
                hash.get_or_create(w, b"unrelated")?;
                hash.get_or_create(w, b"target")
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ClashResolution { .. }));

        env.read(|txn| {
            assert_eq!(hash.len(txn)?, 256);
            assert_eq!(hash.find(txn, b"unrelated")?, None);
            Ok(())
        })
        .unwrap();
    }

    /// # Scenario
    /// Key shapes accepted by `is_valid_key`.
    ///
    /// # Expected behavior
    /// Bare hashes and hashes with a non-zero slot byte are valid.
    #[test]
    fn is_valid_key__shapes() {
        let (_dir, env) = temp_env();
        let hash = Lookups::open(&env, HashWidth::Integer).unwrap().hash;

        assert!(hash.is_valid_key(&[1, 2, 3, 4]));
        assert!(hash.is_valid_key(&[1, 2, 3, 4, 1]));
        assert!(!hash.is_valid_key(&[1, 2, 3, 4, 0]));
        assert!(!hash.is_valid_key(&[1, 2, 3]));
        assert!(!hash.is_valid_key(&[1, 2, 3, 4, 5, 6]));
    }
}
