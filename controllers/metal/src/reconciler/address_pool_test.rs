//! Unit tests for the AddressPool reconciler

#[cfg(test)]
mod tests {
    use crate::test_utils::*;
    use crds::*;
    use store_client::MockStoreClient;

    fn key(name: &str) -> ObjectReference {
        ObjectReference::new("default", name)
    }

    fn pxe_pool(start: &str, end: &str, ready: bool) -> AddressPool {
        create_test_address_pool("pxe", "default", "10.0.0.0/24", start, end, ready)
    }

    #[tokio::test]
    async fn test_valid_pool_becomes_ready() {
        // Setup
        let mock = MockStoreClient::new();
        let pool = pxe_pool("10.0.0.10", "10.0.0.19", false);
        mock.insert_address_pool(pool.clone());
        let reconciler = create_test_reconciler(mock.clone());

        // Execute
        reconciler.reconcile_address_pool(&pool).await.unwrap();

        // Assert
        let status = mock.address_pool(&key("pxe")).unwrap().status.unwrap();
        assert_eq!(status.status, PoolState::Ready);
        assert_eq!(status.start_address, "10.0.0.10");
        assert_eq!(status.last_address, "10.0.0.19");
        assert_eq!(status.netmask, "255.255.255.0");
        assert_eq!(status.available_addresses, 10);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_available_count_tracks_claims() {
        // Setup
        let mock = MockStoreClient::new();
        let mut pool = pxe_pool("10.0.0.10", "10.0.0.19", true);
        if let Some(status) = pool.status.as_mut() {
            status.address_allocation.insert(
                "10.0.0.10".to_string(),
                ObjectReferenceWithKind::inventory(&key("node-a")),
            );
        }
        mock.insert_address_pool(pool.clone());
        let reconciler = create_test_reconciler(mock.clone());

        // Execute
        reconciler.reconcile_address_pool(&pool).await.unwrap();

        // Assert
        let status = mock.address_pool(&key("pxe")).unwrap().status.unwrap();
        assert_eq!(status.available_addresses, 9);
        assert_eq!(status.address_allocation.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_pool_is_flagged_and_claims_kept() {
        // Setup: start address outside the CIDR
        let mock = MockStoreClient::new();
        let mut pool = pxe_pool("10.0.1.10", "10.0.0.19", true);
        if let Some(status) = pool.status.as_mut() {
            status.address_allocation.insert(
                "10.0.0.12".to_string(),
                ObjectReferenceWithKind::cluster(&key("c1")),
            );
        }
        mock.insert_address_pool(pool.clone());
        let reconciler = create_test_reconciler(mock.clone());

        // Execute
        reconciler.reconcile_address_pool(&pool).await.unwrap();

        // Assert
        let stored = mock.address_pool(&key("pxe")).unwrap();
        assert!(!stored.is_ready());
        let status = stored.status.unwrap();
        assert_eq!(status.status, PoolState::Invalid);
        assert!(status.error.is_some());
        assert_eq!(status.address_allocation.len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_pool_is_not_rewritten() {
        let mock = MockStoreClient::new();
        let pool = pxe_pool("10.0.0.10", "10.0.0.19", false);
        mock.insert_address_pool(pool.clone());
        let reconciler = create_test_reconciler(mock.clone());

        reconciler.reconcile_address_pool(&pool).await.unwrap();
        reconciler.reconcile_address_pool(&pool).await.unwrap();

        assert_eq!(mock.write_count("update_address_pool_status"), 1);
    }
}
