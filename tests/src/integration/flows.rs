//! # Client Flows
//!
//! End-to-end client scenarios through [`NodeApi`] on in-process clusters,
//! with real encryption at the edges.
//!
//! ## Flows Tested:
//!
//! 1. **Register → Resolve → Encrypt → Send → Fetch → Decrypt** across two nodes
//! 2. **Capacity**: `MailboxFull` on the fourth envelope at cap 3
//! 3. **Deletion**: owner-only, `IndexOutOfRange` afterwards
//! 4. **Unregister**: pseudonym disappears on every node

#[cfg(test)]
mod tests {
    use mr_02_mailbox_store::{MailboxStoreApi, StoreConfig};
    use mr_04_node_service::{
        DeleteAllRequest, DeleteOneRequest, FetchQuery, NodeApi, RegisterRequest, SendRequest,
        SendTarget, UnregisterRequest,
    };
    use shared_types::{fingerprint, ErrorKind, MessageCipher, OwnerToken, PublicKey, RelayError};

    use crate::support::{Cluster, EciesCipher, KeyPair, TestNode};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn owner() -> OwnerToken {
        OwnerToken::new(b"tj-owner-token".to_vec())
    }

    async fn register(node: &TestNode, name: &str, key: &PublicKey) {
        node.service
            .register(RegisterRequest {
                pseudonym: name.parse().unwrap(),
                public_key: key.clone(),
                owner_token: owner(),
                deadline_ms: None,
            })
            .await
            .unwrap();
    }

    fn send_to(name: &str, ciphertext: Vec<u8>) -> SendRequest {
        SendRequest {
            to: SendTarget::Pseudonym(name.parse().unwrap()),
            ciphertext,
            sender: b"ka".to_vec(),
            deadline_ms: None,
        }
    }

    // =============================================================================
    // INTEGRATION TESTS: TWO-NODE MESSAGE EXCHANGE
    // =============================================================================

    /// "tj" registers on node A; someone on node B looks tj up, encrypts to
    /// the published key and sends through B; tj reads it back from A.
    #[tokio::test]
    async fn test_tj_receives_message_sent_through_other_node() {
        let cluster = Cluster::new(2);
        let (a, b) = (cluster.node(0), cluster.node(1));
        let tj = KeyPair::generate();

        register(a, "tj", tj.public()).await;
        cluster.rounds(2).await;

        let resolved = b.service.resolve("tj".parse().unwrap(), None).await.unwrap();
        assert_eq!(&resolved.public_key, tj.public());

        let sealed = EciesCipher
            .encrypt(&resolved.public_key, b"Hello. You here?")
            .unwrap();
        let sent = b.service.send(send_to("tj", sealed)).await.unwrap();
        assert_eq!(sent.fingerprint, resolved.fingerprint);

        cluster.rounds(2).await;

        let count = a.service.count(resolved.fingerprint, None).await.unwrap();
        assert_eq!(count.count, 1);
        let fetched = a
            .service
            .fetch(resolved.fingerprint, FetchQuery::default())
            .await
            .unwrap();
        let stored = &fetched.envelopes[0];
        assert_eq!(stored.envelope.sender, b"ka".to_vec());
        assert_eq!(
            EciesCipher
                .decrypt(tj.secret(), &stored.envelope.ciphertext)
                .unwrap(),
            b"Hello. You here?"
        );

        // tj clears the message from A; B follows.
        a.service
            .delete_one(DeleteOneRequest {
                fingerprint: resolved.fingerprint,
                index: stored.sequence,
                owner_token: owner(),
                deadline_ms: None,
            })
            .await
            .unwrap();
        cluster.rounds(2).await;
        assert_eq!(b.service.count(resolved.fingerprint, None).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_send_by_fingerprint_without_registration() {
        let cluster = Cluster::new(1);
        let node = cluster.node(0);
        let key = KeyPair::generate();
        let fp = fingerprint(key.public()).unwrap();

        let sealed = EciesCipher.encrypt(key.public(), b"anyone there").unwrap();
        node.service
            .send(SendRequest {
                to: SendTarget::Fingerprint(fp),
                ciphertext: sealed,
                sender: Vec::new(),
                deadline_ms: None,
            })
            .await
            .unwrap();

        assert_eq!(node.service.count(fp, None).await.unwrap().count, 1);
    }

    // =============================================================================
    // INTEGRATION TESTS: CAPACITY AND DELETION
    // =============================================================================

    #[tokio::test]
    async fn test_mailbox_full_at_cap_three() {
        let config = StoreConfig {
            mailbox_cap: 3,
            ..StoreConfig::default()
        };
        let cluster = Cluster::with_store_config(1, config);
        let node = cluster.node(0);
        let tj = KeyPair::generate();
        register(node, "tj", tj.public()).await;

        for i in 0..3u8 {
            node.service.send(send_to("tj", vec![i])).await.unwrap();
        }
        let err = node.service.send(send_to("tj", vec![3])).await.unwrap_err();
        assert_eq!(err, RelayError::MailboxFull { count: 3, cap: 3 });

        // Freeing a slot makes room again.
        let fp = fingerprint(tj.public()).unwrap();
        node.service
            .delete_one(DeleteOneRequest {
                fingerprint: fp,
                index: 0,
                owner_token: owner(),
                deadline_ms: None,
            })
            .await
            .unwrap();
        node.service.send(send_to("tj", vec![4])).await.unwrap();
        assert_eq!(node.service.count(fp, None).await.unwrap().count, 3);
    }

    #[tokio::test]
    async fn test_delete_requires_owner_and_leaves_gap() {
        let cluster = Cluster::new(1);
        let node = cluster.node(0);
        let tj = KeyPair::generate();
        register(node, "tj", tj.public()).await;
        let fp = fingerprint(tj.public()).unwrap();

        for i in 0..3u8 {
            node.service.send(send_to("tj", vec![i])).await.unwrap();
        }

        let stranger = node
            .service
            .delete_all(DeleteAllRequest {
                fingerprint: fp,
                owner_token: OwnerToken::new(b"not-tj".to_vec()),
                deadline_ms: None,
            })
            .await
            .unwrap_err();
        assert_eq!(stranger.kind(), ErrorKind::Unauthorized);
        assert_eq!(node.service.count(fp, None).await.unwrap().count, 3);

        node.service
            .delete_one(DeleteOneRequest {
                fingerprint: fp,
                index: 1,
                owner_token: owner(),
                deadline_ms: None,
            })
            .await
            .unwrap();

        assert_eq!(
            node.store.get(&fp, 1).unwrap_err(),
            RelayError::IndexOutOfRange { index: 1 }
        );
        assert_eq!(node.store.get(&fp, 2).unwrap().envelope.ciphertext, vec![2]);
        assert_eq!(node.service.count(fp, None).await.unwrap().count, 2);

        let cleared = node
            .service
            .delete_all(DeleteAllRequest {
                fingerprint: fp,
                owner_token: owner(),
                deadline_ms: None,
            })
            .await
            .unwrap();
        assert_eq!(cleared.deleted, 2);
    }

    // =============================================================================
    // INTEGRATION TESTS: REGISTRY
    // =============================================================================

    #[tokio::test]
    async fn test_unregister_propagates() {
        let cluster = Cluster::new(2);
        let (a, b) = (cluster.node(0), cluster.node(1));
        let tj = KeyPair::generate();

        register(a, "tj", tj.public()).await;
        cluster.rounds(2).await;
        assert!(b.service.resolve("tj".parse().unwrap(), None).await.is_ok());

        b.service
            .unregister(UnregisterRequest {
                pseudonym: "tj".parse().unwrap(),
                owner_token: owner(),
                deadline_ms: None,
            })
            .await
            .unwrap();
        cluster.rounds(2).await;

        let err = a
            .service
            .resolve("tj".parse().unwrap(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_pseudonym_taken_by_other_owner() {
        let cluster = Cluster::new(1);
        let node = cluster.node(0);
        register(node, "tj", KeyPair::generate().public()).await;

        let err = node
            .service
            .register(RegisterRequest {
                pseudonym: "tj".parse().unwrap(),
                public_key: KeyPair::generate().public().clone(),
                owner_token: OwnerToken::new(b"impostor".to_vec()),
                deadline_ms: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PseudonymTaken);
    }
}
