//! Engine scenarios driven through a participant's inbox

#[cfg(test)]
mod engine_tests {
    use crate::consensus::*;
    use crate::error::{RoundError, TransportError};
    use crate::logger::init_test_logger;
    use crate::network::{InboxSender, Message, Transport};
    use crate::topology::TraitorSet;
    use async_trait::async_trait;
    use parking_lot::{Mutex, RwLock};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    const WAIT: Duration = Duration::from_secs(5);

    /// Captures outgoing messages instead of delivering them.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(ParticipantId, Message)>>,
    }

    impl RecordingTransport {
        fn plans(&self, round: Round) -> Vec<(ParticipantId, Plan)> {
            self.sent
                .lock()
                .iter()
                .filter_map(|(to, message)| match message {
                    Message::Plan(p) if p.round == round => Some((*to, p.plan)),
                    _ => None,
                })
                .collect()
        }

        fn ack_targets(&self) -> Vec<ParticipantId> {
            self.sent
                .lock()
                .iter()
                .filter(|(_, message)| matches!(message, Message::Ack { .. }))
                .map(|(to, _)| *to)
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, to: ParticipantId, message: Message) -> Result<(), TransportError> {
            self.sent.lock().push((to, message));
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct Harness {
        inbox: InboxSender,
        transport: Arc<RecordingTransport>,
        status: Arc<RwLock<ParticipantStatus>>,
        task: JoinHandle<Result<ParticipantReport, RoundError>>,
    }

    fn spawn(id: ParticipantId, plan: Plan, settings: ProtocolSettings, seed: u64) -> Harness {
        init_test_logger();
        let transport = Arc::new(RecordingTransport::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let participant = KingParticipant::new(
            id,
            plan,
            Arc::new(settings),
            transport.clone(),
            rx,
            StdRng::seed_from_u64(seed),
        );
        let status = participant.status();

        Harness {
            inbox: tx,
            transport,
            status,
            task: tokio::spawn(participant.run()),
        }
    }

    impl Harness {
        fn acks(&self, from: &[ParticipantId]) {
            for &id in from {
                self.inbox.send(Message::ack(id)).unwrap();
            }
        }

        fn plans(&self, round: Round, plans: &[(ParticipantId, Plan)]) {
            for &(from, plan) in plans {
                self.inbox.send(Message::plan(from, round, plan)).unwrap();
            }
        }

        fn phase(&self) -> Phase {
            self.status.read().phase
        }

        async fn wait_for_phase(&self, phase: Phase) {
            tokio::time::timeout(WAIT, async {
                while self.phase() != phase {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("participant never reached the expected phase");
        }

        async fn finish(self) -> Result<ParticipantReport, RoundError> {
            tokio::time::timeout(WAIT, self.task)
                .await
                .expect("participant did not finish")
                .expect("participant task panicked")
        }
    }

    fn settings(total: usize) -> ProtocolSettings {
        ProtocolSettings::new(total, TraitorSet::for_participants(total))
    }

    fn decisions(report: &ParticipantReport) -> Vec<Decision> {
        report.rounds.iter().map(|r| r.decision).collect()
    }

    #[tokio::test]
    async fn test_barrier_waits_for_distinct_acks() {
        let node = spawn(0, Plan::Attack, settings(4), 1);

        node.acks(&[1, 1, 2, 0, 9]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(node.phase(), Phase::Barrier);
        assert_eq!(node.status.read().acks, 2);
        assert_eq!(node.transport.ack_targets(), vec![1, 2, 3]);
        assert!(node.transport.plans(1).is_empty());

        node.acks(&[3]);
        node.wait_for_phase(Phase::Round(1)).await;
        assert_eq!(node.transport.plans(1).len(), 3);

        let peers = [(1, Plan::Attack), (2, Plan::Attack), (3, Plan::Retreat)];
        node.plans(1, &peers);
        node.plans(2, &peers);

        let report = node.finish().await.unwrap();
        assert_eq!(report.rounds.len(), 2);
    }

    #[tokio::test]
    async fn test_plans_sent_before_barrier_release_are_kept() {
        let node = spawn(2, Plan::Retreat, settings(4), 2);

        // Round 1 plans arrive while the participant is still collecting acks.
        node.plans(1, &[(0, Plan::Attack), (1, Plan::Attack), (3, Plan::Attack)]);
        node.acks(&[0, 1, 3]);
        node.plans(2, &[(0, Plan::Attack), (1, Plan::Attack), (3, Plan::Attack)]);

        let report = node.finish().await.unwrap();
        assert_eq!(report.rounds[0].tally.votes(Plan::Attack), 3);
        assert_eq!(report.plan, Plan::Attack);
    }

    #[tokio::test]
    async fn test_majority_adoption_overrides_own_plan() {
        // N = 5, one traitor: threshold 3, so four matching votes win.
        let node = spawn(0, Plan::Retreat, settings(5), 3);
        node.acks(&[1, 2, 3, 4]);
        node.plans(
            1,
            &[(1, Plan::Attack), (2, Plan::Attack), (3, Plan::Attack), (4, Plan::Attack)],
        );
        node.plans(
            2,
            &[(1, Plan::Retreat), (2, Plan::Attack), (3, Plan::Retreat), (4, Plan::Retreat)],
        );

        let report = node.finish().await.unwrap();
        assert_eq!(
            decisions(&report),
            vec![Decision::Majority(Plan::Attack), Decision::King(Plan::Attack)]
        );
        assert_eq!(report.plan, Plan::Attack);
    }

    #[tokio::test]
    async fn test_adopted_plan_is_broadcast_next_round() {
        let node = spawn(0, Plan::Retreat, settings(5), 4);
        node.acks(&[1, 2, 3, 4]);
        node.plans(
            1,
            &[(1, Plan::Attack), (2, Plan::Attack), (3, Plan::Attack), (4, Plan::Attack)],
        );
        node.wait_for_phase(Phase::Round(2)).await;

        let sent: Vec<Plan> = node.transport.plans(2).into_iter().map(|(_, p)| p).collect();
        assert_eq!(sent, vec![Plan::Attack; 4]);
        assert!(node.transport.plans(1).iter().all(|&(_, p)| p == Plan::Retreat));

        node.plans(2, &[(1, Plan::Attack), (2, Plan::Attack), (3, Plan::Attack), (4, Plan::Attack)]);
        node.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_tie_falls_back_to_king() {
        let node = spawn(3, Plan::Attack, settings(5), 5);
        node.acks(&[0, 1, 2, 4]);
        // Round 1, king 1: two votes each.
        node.plans(
            1,
            &[(0, Plan::Attack), (1, Plan::Retreat), (2, Plan::Retreat), (4, Plan::Attack)],
        );
        // Round 2, king 2: two votes each again.
        node.plans(
            2,
            &[(0, Plan::Retreat), (1, Plan::Retreat), (2, Plan::Attack), (4, Plan::Attack)],
        );

        let report = node.finish().await.unwrap();
        assert_eq!(
            report.rounds.iter().map(|r| r.king).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(
            decisions(&report),
            vec![Decision::King(Plan::Retreat), Decision::King(Plan::Attack)]
        );
    }

    #[tokio::test]
    async fn test_king_without_majority_keeps_its_plan() {
        let node = spawn(1, Plan::Retreat, settings(4), 6);
        node.acks(&[0, 2, 3]);
        node.plans(1, &[(0, Plan::Attack), (2, Plan::Attack), (3, Plan::Retreat)]);
        node.plans(2, &[(0, Plan::Attack), (2, Plan::Retreat), (3, Plan::Retreat)]);

        let report = node.finish().await.unwrap();
        assert_eq!(report.rounds[0].decision, Decision::Retained(Plan::Retreat));
        assert_eq!(report.rounds[1].decision, Decision::King(Plan::Retreat));
    }

    #[tokio::test]
    async fn test_duplicate_plans_inflate_collected_count() {
        let node = spawn(0, Plan::Retreat, settings(4), 7);
        node.acks(&[1, 2, 3]);

        // Peer 3 never sends for round 1, yet peer 1 repeating itself fills
        // the round.
        node.plans(1, &[(1, Plan::Attack), (1, Plan::Attack), (2, Plan::Attack)]);
        node.wait_for_phase(Phase::Round(2)).await;

        node.plans(2, &[(1, Plan::Attack), (2, Plan::Attack), (3, Plan::Attack)]);
        let report = node.finish().await.unwrap();

        let first = &report.rounds[0];
        assert_eq!(first.tally.votes(Plan::Attack), 3);
        assert_eq!(first.decision, Decision::King(Plan::Attack));
    }

    #[tokio::test]
    async fn test_overfull_round_releases_at_once() {
        let node = spawn(0, Plan::Retreat, settings(4), 13);

        // Four entries for three peers are waiting before the barrier lifts.
        node.plans(
            1,
            &[(1, Plan::Attack), (1, Plan::Attack), (2, Plan::Attack), (3, Plan::Retreat)],
        );
        node.acks(&[1, 2, 3]);
        node.wait_for_phase(Phase::Round(2)).await;

        node.plans(2, &[(1, Plan::Attack), (2, Plan::Attack), (3, Plan::Attack)]);
        let report = node.finish().await.unwrap();

        let first = &report.rounds[0];
        assert_eq!(first.tally.votes(Plan::Attack), 3);
        assert_eq!(first.tally.votes(Plan::Retreat), 1);
        assert_eq!(first.decision, Decision::King(Plan::Attack));
    }

    #[tokio::test]
    async fn test_keep_first_waits_for_every_sender() {
        let settings = settings(4).with_dedup_policy(DedupPolicy::KeepFirst);
        let node = spawn(0, Plan::Retreat, settings, 8);
        node.acks(&[1, 2, 3]);

        node.plans(1, &[(1, Plan::Attack), (1, Plan::Attack), (2, Plan::Attack)]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(node.phase(), Phase::Round(1));

        node.plans(1, &[(3, Plan::Retreat)]);
        node.plans(2, &[(1, Plan::Attack), (2, Plan::Attack), (3, Plan::Attack)]);
        let report = node.finish().await.unwrap();

        let first = &report.rounds[0];
        assert_eq!(first.tally.votes(Plan::Attack), 2);
        assert_eq!(first.tally.votes(Plan::Retreat), 1);
    }

    #[tokio::test]
    async fn test_traitor_lies_differently_to_peers() {
        let mut split_seen = false;

        for seed in 0..16 {
            let node = spawn(3, Plan::Attack, settings(4), seed);
            node.acks(&[0, 1, 2]);
            for round in 1..=2 {
                node.plans(round, &[(0, Plan::Attack), (1, Plan::Attack), (2, Plan::Attack)]);
            }
            let transport = Arc::clone(&node.transport);
            let report = node.finish().await.unwrap();
            assert_eq!(report.role, Role::Traitor);

            for round in 1..=2 {
                let values: BTreeSet<Plan> =
                    transport.plans(round).into_iter().map(|(_, p)| p).collect();
                split_seen |= values.len() > 1;
            }
        }

        assert!(split_seen, "traitor never sent different plans within a round");
    }

    #[tokio::test]
    async fn test_honest_participant_sends_same_plan_to_all() {
        let node = spawn(0, Plan::Retreat, settings(4), 9);
        node.acks(&[1, 2, 3]);
        node.wait_for_phase(Phase::Round(1)).await;

        let sent = node.transport.plans(1);
        assert_eq!(sent.iter().map(|&(to, _)| to).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(sent.iter().all(|&(_, plan)| plan == Plan::Retreat));
    }

    fn two_traitor_kings() -> ProtocolSettings {
        // Kings 1 and 2 are consecutive traitors, so round 2 reselects.
        ProtocolSettings::new(4, TraitorSet::from_ids([1, 2]))
    }

    fn feed_rounds(node: &Harness, rounds: Round) {
        node.acks(&[1, 2, 3]);
        for round in 1..=rounds {
            node.plans(round, &[(1, Plan::Attack), (2, Plan::Retreat), (3, Plan::Attack)]);
        }
    }

    #[tokio::test]
    async fn test_display_only_reselection_keeps_round_numbers() {
        let node = spawn(0, Plan::Attack, two_traitor_kings(), 10);
        feed_rounds(&node, 3);

        let report = node.finish().await.unwrap();
        let played: Vec<(Round, ParticipantId)> =
            report.rounds.iter().map(|r| (r.round, r.king)).collect();
        assert_eq!(played, vec![(1, 1), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_advance_round_reselection_skips_rounds() {
        let settings = two_traitor_kings().with_king_policy(KingPolicy::AdvanceRound);
        let node = spawn(0, Plan::Attack, settings, 11);
        feed_rounds(&node, 3);

        let report = node.finish().await.unwrap();
        let played: Vec<(Round, ParticipantId)> =
            report.rounds.iter().map(|r| (r.round, r.king)).collect();
        assert_eq!(played, vec![(1, 1), (3, 3)]);
    }

    #[tokio::test]
    async fn test_closed_inbox_ends_participant() {
        let node = spawn(0, Plan::Attack, settings(4), 12);
        let Harness { inbox, task, .. } = node;
        drop(inbox);

        let result = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(
            result,
            Err(RoundError::InboxClosed { id: 0, ref phase }) if phase == "readiness barrier"
        ));
    }
}
