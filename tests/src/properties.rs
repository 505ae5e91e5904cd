//! # Properties
//!
//! Randomized checks of the mailbox model and of replication convergence.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use mr_01_registry::RegistryApi;
    use mr_02_mailbox_store::MailboxStoreApi;
    use mr_03_replication::ReplicationApi;
    use shared_types::{fingerprint, OwnerToken, Pseudonym, PublicKey, RelayError};

    use crate::support::Cluster;

    #[derive(Debug, Clone)]
    enum Op {
        Append(u8),
        DeleteOne(u8),
        DeleteAll,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => any::<u8>().prop_map(Op::Append),
            3 => any::<u8>().prop_map(Op::DeleteOne),
            1 => Just(Op::DeleteAll),
        ]
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Count always equals appends minus successful deletes, and
        /// sequence numbers are handed out once.
        #[test]
        fn prop_count_tracks_live_envelopes(ops in proptest::collection::vec(op(), 1..60)) {
            let cluster = Cluster::new(1);
            let node = cluster.node(0);
            let key = PublicKey::new(b"prop-key".to_vec());
            let token = OwnerToken::new(b"prop-owner".to_vec());
            node.registry.register("prop".parse().unwrap(), key.clone(), &token).unwrap();
            let fp = fingerprint(&key).unwrap();

            let mut live = BTreeSet::new();
            let mut issued = BTreeSet::new();
            for op in ops {
                match op {
                    Op::Append(byte) => {
                        let seq = node.store.append(&fp, Vec::new(), vec![byte]).unwrap();
                        prop_assert!(issued.insert(seq), "sequence {} reused", seq);
                        live.insert(seq);
                    }
                    Op::DeleteOne(pick) => {
                        let index = if issued.is_empty() {
                            u64::from(pick)
                        } else {
                            u64::from(pick) % (issued.len() as u64 + 1)
                        };
                        match node.store.delete_one(&fp, index, &token) {
                            Ok(()) => prop_assert!(live.remove(&index)),
                            Err(RelayError::IndexOutOfRange { .. }) | Err(RelayError::NotFound(_)) => {
                                prop_assert!(!live.contains(&index))
                            }
                            Err(e) => prop_assert!(false, "unexpected error {}", e),
                        }
                    }
                    Op::DeleteAll => {
                        match node.store.delete_all(&fp, &token) {
                            Ok(deleted) => prop_assert_eq!(deleted, live.len()),
                            Err(RelayError::NotFound(_)) => prop_assert!(issued.is_empty()),
                            Err(e) => prop_assert!(false, "unexpected error {}", e),
                        }
                        live.clear();
                    }
                }
                prop_assert_eq!(node.store.count(&fp), live.len());
            }
        }

        /// Two writers with arbitrary interleavings of writes and sync rounds
        /// end up identical after enough quiet rounds.
        #[test]
        fn prop_two_nodes_converge(
            writes in proptest::collection::vec((any::<bool>(), any::<u8>(), 0usize..3), 1..30)
        ) {
            let cluster = Cluster::new(2);
            let key = PublicKey::new(b"prop-key".to_vec());
            let fp = fingerprint(&key).unwrap();
            let total = writes.len();

            runtime().block_on(async {
                for (on_b, byte, rounds) in writes {
                    let node = cluster.node(usize::from(on_b));
                    node.store.append(&fp, Vec::new(), vec![byte]).unwrap();
                    node.replication.announce(fp);
                    cluster.rounds(rounds).await;
                }
                cluster.rounds(3).await;
            });

            let a: Vec<_> = cluster.node(0).store.fetch(&fp, 0, 1_000).unwrap()
                .into_iter().map(|s| s.envelope.id).collect();
            let b: Vec<_> = cluster.node(1).store.fetch(&fp, 0, 1_000).unwrap()
                .into_iter().map(|s| s.envelope.id).collect();
            prop_assert_eq!(a.len(), total);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_pseudonym_charset(name in "[A-Za-z0-9_.-]{1,32}") {
            let parsed: Pseudonym = name.parse().unwrap();
            prop_assert_eq!(parsed.as_str(), name.as_str());
        }

        #[test]
        fn prop_pseudonym_rejects_other_characters(
            prefix in "[a-z]{0,8}",
            bad in "[ /@#:!?]",
        ) {
            let name = format!("{}{}", prefix, bad);
            prop_assert!(name.parse::<Pseudonym>().is_err());
        }
    }
}
