//! The intake cycle: one trigger in, at most one reward out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use ecobin_common::models::{IssuedReward, MaterialKind};

use crate::capture::FrameSource;
use crate::classifier::{Classification, Classifier};
use crate::config::OverflowPolicy;
use crate::error::MintError;
use crate::fallback::MaterialResolver;
use crate::reward_client::RewardClient;
use crate::trigger::TriggerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Capturing,
    Classifying,
    Resolving,
    Minting,
    Presenting,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Rewarded(IssuedReward),
    CaptureFailed,
    /// Classification stayed uncertain and the fallback gave up.
    Unresolved,
    MintFailed(MintError),
}

/// Where a freshly minted reward is shown to the depositor.
#[async_trait]
pub trait RewardSink: Send + Sync {
    async fn present(&self, reward: &IssuedReward);
}

pub struct LogSink;

#[async_trait]
impl RewardSink for LogSink {
    async fn present(&self, reward: &IssuedReward) {
        info!(
            "Reward ready: {} points for {}. Redeem at {} (QR: {})",
            reward.points, reward.material, reward.redeem_url, reward.qr_url
        );
    }
}

pub struct IntakeAgent {
    frames: Arc<dyn FrameSource>,
    classifier: Arc<dyn Classifier>,
    resolver: Arc<dyn MaterialResolver>,
    client: Arc<dyn RewardClient>,
    sink: Arc<dyn RewardSink>,
    overflow: OverflowPolicy,
    cooldown: Duration,
}

impl IntakeAgent {
    pub fn new(
        frames: Arc<dyn FrameSource>,
        classifier: Arc<dyn Classifier>,
        resolver: Arc<dyn MaterialResolver>,
        client: Arc<dyn RewardClient>,
        sink: Arc<dyn RewardSink>,
    ) -> Self {
        Self {
            frames,
            classifier,
            resolver,
            client,
            sink,
            overflow: OverflowPolicy::Drop,
            cooldown: Duration::from_millis(500),
        }
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    fn enter(&self, state: CycleState) {
        debug!("Intake cycle -> {:?}", state);
    }

    /// Runs one capture/classify/mint cycle. Mints at most once per call.
    pub async fn run_cycle(&self, event: &TriggerEvent) -> CycleOutcome {
        info!("Deposit detected at {}", event.at);

        self.enter(CycleState::Capturing);
        let frame = match self.frames.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Capture failed: {}", e);
                self.enter(CycleState::Done);
                return CycleOutcome::CaptureFailed;
            }
        };

        self.enter(CycleState::Classifying);
        let classification = match self.classifier.classify(&frame).await {
            Ok(c) => c,
            Err(e) => {
                warn!("{}; treating deposit as uncertain", e);
                Classification::Uncertain
            }
        };

        let material: MaterialKind = match classification {
            Classification::Material(m) => m,
            Classification::Uncertain => {
                self.enter(CycleState::Resolving);
                match self.resolver.resolve(&frame).await {
                    Some(m) => m,
                    None => {
                        self.enter(CycleState::Done);
                        return CycleOutcome::Unresolved;
                    }
                }
            }
        };
        info!("Deposit classified as {}", material);

        self.enter(CycleState::Minting);
        let outcome = match self.client.mint(material).await {
            Ok(reward) => {
                self.enter(CycleState::Presenting);
                self.sink.present(&reward).await;
                CycleOutcome::Rewarded(reward)
            }
            Err(e) => {
                error!("No reward issued for {} deposit: {}", material, e);
                CycleOutcome::MintFailed(e)
            }
        };
        self.enter(CycleState::Done);
        outcome
    }

    /// Processes triggers one at a time until the channel closes or shutdown
    /// is requested. Returns the number of completed cycles.
    pub async fn run(&self, mut rx: mpsc::Receiver<TriggerEvent>, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut cycles = 0u64;
        loop {
            let event = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let outcome = self.run_cycle(&event).await;
            cycles += 1;
            debug!("Cycle {} finished: {:?}", cycles, outcome);

            if !self.cooldown.is_zero() {
                tokio::time::sleep(self.cooldown).await;
            }

            if self.overflow == OverflowPolicy::Drop {
                let mut dropped = 0;
                while rx.try_recv().is_ok() {
                    dropped += 1;
                }
                if dropped > 0 {
                    debug!("Dropped {} trigger(s) that arrived mid-cycle", dropped);
                }
            }
        }
        info!("Intake agent stopped after {} cycle(s)", cycles);
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;

    use crate::capture::Frame;
    use crate::error::{CaptureError, ClassifyError};
    use crate::fallback::{AbortResolver, DefaultMaterial};
    use crate::reward_client::MockRewardClient;

    struct Camera {
        working: bool,
        // Simulates a second deposit landing while the first cycle runs.
        mid_cycle_trigger: Mutex<Option<mpsc::Sender<TriggerEvent>>>,
    }

    impl Camera {
        fn working() -> Self {
            Self { working: true, mid_cycle_trigger: Mutex::new(None) }
        }

        fn broken() -> Self {
            Self { working: false, mid_cycle_trigger: Mutex::new(None) }
        }
    }

    #[async_trait]
    impl FrameSource for Camera {
        async fn capture(&self) -> Result<Frame, CaptureError> {
            let tx = self.mid_cycle_trigger.lock().unwrap().take();
            if let Some(tx) = tx {
                let _ = tx.try_send(event());
            }
            if self.working {
                Ok(Frame::new(vec![1, 2, 3]))
            } else {
                Err(CaptureError::Unavailable("no camera".into()))
            }
        }
    }

    struct Fixed(Result<Classification, String>);

    #[async_trait]
    impl Classifier for Fixed {
        async fn classify(&self, _frame: &Frame) -> Result<Classification, ClassifyError> {
            self.0.clone().map_err(ClassifyError::Failed)
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<IssuedReward>>);

    #[async_trait]
    impl RewardSink for Recording {
        async fn present(&self, reward: &IssuedReward) {
            self.0.lock().unwrap().push(reward.clone());
        }
    }

    fn event() -> TriggerEvent {
        TriggerEvent { at: Utc::now(), raw: "1".into() }
    }

    fn issued(material: MaterialKind) -> IssuedReward {
        IssuedReward {
            token: format!("tok-{}", material),
            material,
            points: if material == MaterialKind::Bottle { 100 } else { 50 },
            redeem_url: format!("http://bin.test/reward/tok-{}", material),
            qr_url: format!("http://bin.test/reward/tok-{}/qrcode", material),
        }
    }

    fn agent(
        camera: Camera,
        classification: Result<Classification, String>,
        resolver: Arc<dyn MaterialResolver>,
        client: MockRewardClient,
        sink: Arc<Recording>,
    ) -> IntakeAgent {
        IntakeAgent::new(Arc::new(camera), Arc::new(Fixed(classification)), resolver, Arc::new(client), sink)
            .with_cooldown(Duration::ZERO)
    }

    #[tokio::test]
    async fn bottle_is_minted_once_and_presented() {
        let mut client = MockRewardClient::new();
        client
            .expect_mint()
            .withf(|m| *m == MaterialKind::Bottle)
            .times(1)
            .returning(|m| Ok(issued(m)));
        let sink = Arc::new(Recording::default());

        let agent = agent(
            Camera::working(),
            Ok(Classification::Material(MaterialKind::Bottle)),
            Arc::new(AbortResolver),
            client,
            sink.clone(),
        );
        let outcome = agent.run_cycle(&event()).await;
        assert_eq!(outcome, CycleOutcome::Rewarded(issued(MaterialKind::Bottle)));
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn uncertain_with_abort_never_mints() {
        let mut client = MockRewardClient::new();
        client.expect_mint().never();
        let sink = Arc::new(Recording::default());

        let agent = agent(Camera::working(), Ok(Classification::Uncertain), Arc::new(AbortResolver), client, sink.clone());
        assert_eq!(agent.run_cycle(&event()).await, CycleOutcome::Unresolved);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn classifier_failure_goes_through_the_fallback() {
        let mut client = MockRewardClient::new();
        client
            .expect_mint()
            .withf(|m| *m == MaterialKind::Paper)
            .times(1)
            .returning(|m| Ok(issued(m)));

        let agent = agent(
            Camera::working(),
            Err("model crashed".into()),
            Arc::new(DefaultMaterial(MaterialKind::Paper)),
            client,
            Arc::new(Recording::default()),
        );
        assert!(matches!(agent.run_cycle(&event()).await, CycleOutcome::Rewarded(r) if r.points == 50));
    }

    #[tokio::test]
    async fn capture_failure_never_mints() {
        let mut client = MockRewardClient::new();
        client.expect_mint().never();

        let agent = agent(
            Camera::broken(),
            Ok(Classification::Material(MaterialKind::Bottle)),
            Arc::new(AbortResolver),
            client,
            Arc::new(Recording::default()),
        );
        assert_eq!(agent.run_cycle(&event()).await, CycleOutcome::CaptureFailed);
    }

    #[tokio::test]
    async fn mint_failure_is_surfaced_without_another_request() {
        let mut client = MockRewardClient::new();
        client
            .expect_mint()
            .times(1)
            .returning(|_| Err(MintError::Indeterminate("timed out".into())));
        let sink = Arc::new(Recording::default());

        let agent = agent(
            Camera::working(),
            Ok(Classification::Material(MaterialKind::Bottle)),
            Arc::new(AbortResolver),
            client,
            sink.clone(),
        );
        assert_eq!(
            agent.run_cycle(&event()).await,
            CycleOutcome::MintFailed(MintError::Indeterminate("timed out".into()))
        );
        assert!(sink.0.lock().unwrap().is_empty());
    }

    async fn run_with_mid_cycle_trigger(overflow: OverflowPolicy, expected_mints: usize) -> u64 {
        let (tx, rx) = mpsc::channel(overflow.channel_capacity());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let camera = Camera::working();
        *camera.mid_cycle_trigger.lock().unwrap() = Some(tx.clone());

        let mut client = MockRewardClient::new();
        client.expect_mint().times(expected_mints).returning(|m| Ok(issued(m)));

        let agent = agent(
            camera,
            Ok(Classification::Material(MaterialKind::Paper)),
            Arc::new(AbortResolver),
            client,
            Arc::new(Recording::default()),
        )
        .with_overflow(overflow);

        tx.send(event()).await.unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), agent.run(rx, shutdown_rx))
            .await
            .expect("agent did not stop when the channel closed")
    }

    #[tokio::test]
    async fn drop_policy_discards_mid_cycle_triggers() {
        assert_eq!(run_with_mid_cycle_trigger(OverflowPolicy::Drop, 1).await, 1);
    }

    #[tokio::test]
    async fn queue_policy_processes_mid_cycle_triggers_in_order() {
        assert_eq!(run_with_mid_cycle_trigger(OverflowPolicy::Queue(4), 2).await, 2);
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_agent() {
        let (_tx, rx) = mpsc::channel::<TriggerEvent>(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut client = MockRewardClient::new();
        client.expect_mint().never();

        let agent = agent(
            Camera::working(),
            Ok(Classification::Uncertain),
            Arc::new(AbortResolver),
            client,
            Arc::new(Recording::default()),
        );
        let handle = tokio::spawn(async move { agent.run(rx, shutdown_rx).await });
        shutdown_tx.send(true).unwrap();
        let cycles = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(cycles, 0);
    }
}
