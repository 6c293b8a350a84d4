//! 用例回放：对每个用例给出预测并发布到主题

use std::path::Path;

use tracing::{info, warn};

use crate::application::fixtures::{PredictionFixture, load_fixtures};
use crate::domain::model::SendOutcome;
use crate::domain::repository::{InboundChannel, OutboundChannel};
use crate::error::{RelayError, RelayResult};
use crate::interface::messaging::BrokerClient;

/// 分类器（模型训练与打分在本仓库之外）
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, fixture: &PredictionFixture) -> RelayResult<i32>;
}

/// 直接返回用例中记录的标签，用于在没有模型时回放整条链路
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordedLabelClassifier;

impl Classifier for RecordedLabelClassifier {
    fn name(&self) -> &str {
        "RECORDED_LABEL"
    }

    fn predict(&self, fixture: &PredictionFixture) -> RelayResult<i32> {
        fixture.recorded_label().ok_or_else(|| {
            RelayError::config(format!(
                "fixture {} has no integer label",
                fixture.path().display()
            ))
        })
    }
}

/// 回放统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub acknowledged: usize,
    pub timed_out: usize,
    pub rejected: usize,
    pub skipped: usize,
}

impl ReplaySummary {
    fn record(&mut self, outcome: &SendOutcome) {
        match outcome {
            SendOutcome::Acknowledged => self.acknowledged += 1,
            SendOutcome::TimedOut => self.timed_out += 1,
            SendOutcome::Rejected(_) => self.rejected += 1,
        }
    }
}

/// 对给定用例逐个预测并发布，单个用例预测失败只跳过该用例
pub async fn replay_fixtures<P, C, M>(
    fixtures: &[PredictionFixture],
    classifier: &M,
    broker: &BrokerClient<P, C>,
) -> ReplaySummary
where
    P: OutboundChannel,
    C: InboundChannel,
    M: Classifier + ?Sized,
{
    let mut summary = ReplaySummary::default();

    for fixture in fixtures {
        let record = match classifier
            .predict(fixture)
            .and_then(|value| fixture.to_record(value))
        {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    fixture = %fixture.path().display(),
                    classifier = classifier.name(),
                    error = %err,
                    "Skipping fixture"
                );
                summary.skipped += 1;
                continue;
            }
        };

        let outcome = broker.send(&record).await;
        info!(
            fixture = %fixture.path().display(),
            classifier = classifier.name(),
            outcome = outcome.label(),
            "Replayed fixture"
        );
        summary.record(&outcome);
    }

    summary
}

/// 从目录加载用例后回放
pub async fn replay_fixtures_dir<P, C, M>(
    dir: &Path,
    classifier: &M,
    broker: &BrokerClient<P, C>,
) -> RelayResult<ReplaySummary>
where
    P: OutboundChannel,
    C: InboundChannel,
    M: Classifier + ?Sized,
{
    let fixtures = load_fixtures(dir)?;
    info!(dir = %dir.display(), count = fixtures.len(), "Loaded prediction fixtures");
    Ok(replay_fixtures(&fixtures, classifier, broker).await)
}
