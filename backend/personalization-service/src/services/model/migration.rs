/// Weight Migration Between Tiers
///
/// Tensors are paired positionally over the flattened parameter lists. A
/// tensor whose new shape fits inside the old one (same rank, no axis grows)
/// inherits the leading slice of the old values; anything else keeps the
/// candidate's fresh initialization.
use ndarray::{ArrayD, Dimension, IxDyn};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Tensors carried over from the old network
    pub preserved: usize,
    /// Tensors left at their fresh initialization
    pub reinitialized: usize,
}

/// Whether every axis of `new` fits inside `old`
pub fn can_slice(old: &[usize], new: &[usize]) -> bool {
    old.len() == new.len() && new.iter().zip(old).all(|(n, o)| n <= o)
}

fn leading_slice(old: &ArrayD<f32>, shape: &[usize]) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(shape), |index| old[index.slice()])
}

/// Carry old weights into a freshly initialized candidate
pub fn migrate_tensors(
    old: &[ArrayD<f32>],
    fresh: Vec<ArrayD<f32>>,
) -> (Vec<ArrayD<f32>>, MigrationReport) {
    let mut report = MigrationReport::default();

    let migrated = fresh
        .into_iter()
        .enumerate()
        .map(|(position, candidate)| match old.get(position) {
            Some(previous) if can_slice(previous.shape(), candidate.shape()) => {
                report.preserved += 1;
                leading_slice(previous, candidate.shape())
            }
            _ => {
                report.reinitialized += 1;
                candidate
            }
        })
        .collect();

    debug!(
        preserved = report.preserved,
        reinitialized = report.reinitialized,
        "Migrated classifier weights"
    );

    (migrated, report)
}
