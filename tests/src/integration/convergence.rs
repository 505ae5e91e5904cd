//! # Replication Convergence
//!
//! Multi-node scenarios: concurrent writers, partitions and deletions must
//! leave every node with the same envelopes in the same order, with nothing
//! lost and nothing duplicated.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use mr_01_registry::RegistryApi;
    use mr_02_mailbox_store::MailboxStoreApi;
    use mr_03_replication::ReplicationApi;
    use shared_types::{fingerprint, EnvelopeId, Fingerprint, OwnerToken, PublicKey};

    use crate::support::{Cluster, TestNode};

    fn owner() -> OwnerToken {
        OwnerToken::new(b"tj-owner".to_vec())
    }

    fn register_tj(node: &TestNode) -> Fingerprint {
        let key = PublicKey::new(b"tj-public-key".to_vec());
        node.registry
            .register("tj".parse().unwrap(), key.clone(), &owner())
            .unwrap();
        fingerprint(&key).unwrap()
    }

    fn write(node: &TestNode, fp: &Fingerprint, body: Vec<u8>) {
        node.store.append(fp, Vec::new(), body).unwrap();
        node.replication.announce(*fp);
    }

    fn ids(node: &TestNode, fp: &Fingerprint) -> Vec<EnvelopeId> {
        node.store
            .fetch(fp, 0, 10_000)
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.envelope.id)
            .collect()
    }

    fn assert_converged(cluster: &Cluster, fp: &Fingerprint, expected: usize) {
        let reference = ids(cluster.node(0), fp);
        assert_eq!(reference.len(), expected);
        assert_eq!(
            reference.iter().collect::<HashSet<_>>().len(),
            expected,
            "duplicate envelopes"
        );
        for node in &cluster.nodes {
            assert_eq!(ids(node, fp), reference, "{} diverged", node.address);
        }
    }

    // =============================================================================
    // CONCURRENT WRITERS
    // =============================================================================

    #[tokio::test]
    async fn test_three_writers_converge_without_loss_or_duplication() {
        let cluster = Cluster::new(3);
        let fp = register_tj(cluster.node(0));
        cluster.rounds(1).await;

        for (n, node) in cluster.nodes.iter().enumerate() {
            for i in 0..4u8 {
                write(node, &fp, vec![n as u8, i]);
            }
        }
        cluster.rounds(3).await;
        assert_converged(&cluster, &fp, 12);

        // Quiet rounds change nothing.
        cluster.rounds(2).await;
        assert_converged(&cluster, &fp, 12);
    }

    #[tokio::test]
    async fn test_many_mailboxes_replicate() {
        let cluster = Cluster::new(2);
        let fps: Vec<Fingerprint> = (0..40u8)
            .map(|i| fingerprint(&PublicKey::new(vec![i, 0xAB])).unwrap())
            .collect();

        for fp in &fps {
            write(cluster.node(0), fp, b"x".to_vec());
        }
        cluster.rounds(4).await;

        let b = cluster.node(1);
        for fp in &fps {
            assert_eq!(b.store.count(fp), 1);
        }
        assert_eq!(b.store.mailbox_count(), fps.len());
    }

    // =============================================================================
    // PARTITIONS
    // =============================================================================

    #[tokio::test]
    async fn test_partitioned_node_catches_up() {
        let cluster = Cluster::new(3);
        let fp = register_tj(cluster.node(0));
        cluster.rounds(1).await;

        cluster.set_offline(2, true);
        write(cluster.node(0), &fp, b"while away 1".to_vec());
        write(cluster.node(1), &fp, b"while away 2".to_vec());
        cluster.rounds(2).await;
        assert_eq!(cluster.node(2).store.count(&fp), 0);
        assert_eq!(cluster.node(1).store.count(&fp), 2);

        cluster.set_offline(2, false);
        cluster.rounds(3).await;
        assert_converged(&cluster, &fp, 2);

        assert!(cluster.node(0).replication.stats().sessions_failed > 0);
    }

    // =============================================================================
    // DELETIONS
    // =============================================================================

    #[tokio::test]
    async fn test_deletion_reaches_every_node_and_stays_deleted() {
        let cluster = Cluster::new(3);
        let fp = register_tj(cluster.node(0));
        for i in 0..3u8 {
            write(cluster.node(0), &fp, vec![i]);
        }
        cluster.rounds(3).await;
        assert_converged(&cluster, &fp, 3);

        let c = cluster.node(2);
        let first = c.store.fetch(&fp, 0, 1).unwrap()[0].sequence;
        c.store.delete_one(&fp, first, &owner()).unwrap();
        c.replication.announce(fp);
        cluster.rounds(3).await;
        assert_converged(&cluster, &fp, 2);

        c.store.delete_all(&fp, &owner()).unwrap();
        c.replication.announce(fp);
        cluster.rounds(3).await;
        for node in &cluster.nodes {
            assert_eq!(node.store.count(&fp), 0, "{} resurrected", node.address);
        }
    }

    #[tokio::test]
    async fn test_deletion_on_one_side_and_append_on_other() {
        let cluster = Cluster::new(2);
        let fp = register_tj(cluster.node(0));
        write(cluster.node(0), &fp, b"old".to_vec());
        cluster.rounds(2).await;

        let (a, b) = (cluster.node(0), cluster.node(1));
        a.store.delete_all(&fp, &owner()).unwrap();
        a.replication.announce(fp);
        write(b, &fp, b"new".to_vec());
        cluster.rounds(3).await;

        assert_converged(&cluster, &fp, 1);
        assert_eq!(
            a.store.fetch(&fp, 0, 10).unwrap()[0].envelope.ciphertext,
            b"new".to_vec()
        );
    }

    #[tokio::test]
    async fn test_deletion_survives_owner_leaving_mid_replication() {
        let cluster = Cluster::new(3);
        let fp = register_tj(cluster.node(0));
        write(cluster.node(0), &fp, b"old".to_vec());
        cluster.rounds(2).await;
        assert_converged(&cluster, &fp, 1);

        // Node 2 misses the deletion and the unregister while away.
        cluster.set_offline(2, true);
        let a = cluster.node(0);
        a.store.delete_all(&fp, &owner()).unwrap();
        a.replication.announce(fp);
        a.registry.unregister(&"tj".parse().unwrap(), &owner()).unwrap();
        write(a, &fp, b"new".to_vec());
        cluster.rounds(2).await;

        cluster.set_offline(2, false);
        cluster.rounds(4).await;
        assert_converged(&cluster, &fp, 1);
        assert_eq!(
            cluster.node(2).store.fetch(&fp, 0, 10).unwrap()[0].envelope.ciphertext,
            b"new".to_vec()
        );
    }
}
