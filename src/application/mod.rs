pub mod fixtures;
pub mod replay;

pub use fixtures::{PredictionFixture, load_fixtures};
pub use replay::{Classifier, RecordedLabelClassifier, ReplaySummary, replay_fixtures, replay_fixtures_dir};
