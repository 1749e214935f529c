use std::fmt;

/// Fields extracted from one item's detail page.
///
/// `title`, `sales_rank`, `rating` and `variant_count` are the key fields
/// the completeness check inspects; everything else is carried opaquely.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingRecord {
    pub title: Option<String>,
    pub sales_rank: Option<u64>,
    pub rating: Option<f32>,
    pub variant_count: Option<u32>,
    pub price_cents: Option<u64>,
    pub review_count: Option<u64>,
    /// Derived by the estimator from the sales rank; not a key field.
    pub estimated_monthly_sales: Option<u64>,
}

/// Number of key fields the completeness heuristic looks at.
pub const KEY_FIELD_COUNT: usize = 4;

/// Default fraction of missing key fields at which a record counts as incomplete.
pub const DEFAULT_COMPLETENESS_THRESHOLD: f32 = 0.75;

/// Why a task attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    SessionCreate,
    SessionTimeout,
    Extraction,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::SessionCreate => write!(f, "session create failed"),
            FailureKind::SessionTimeout => write!(f, "session readiness timeout"),
            FailureKind::Extraction => write!(f, "extraction failed"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Structured error shape for a task that produced no usable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The one outcome every task resolves to: a record (possibly partial) or a
/// structured failure. Never both, never neither.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Record(ListingRecord),
    Failed(TaskFailure),
}

impl ListingRecord {
    fn missing_key_fields(&self) -> usize {
        usize::from(self.title.is_none())
            + usize::from(self.sales_rank.is_none())
            + usize::from(self.rating.is_none())
            + usize::from(self.variant_count.is_none())
    }
}

/// Fraction of the key fields that are missing, in `[0.0, 1.0]`.
pub fn missing_key_field_fraction(record: &ListingRecord) -> f32 {
    record.missing_key_fields() as f32 / KEY_FIELD_COUNT as f32
}

/// Completeness heuristic driving retries.
///
/// A failure is never complete. A record is incomplete once the missing
/// fraction of its key fields reaches the threshold. The threshold is a
/// tunable heuristic, not an invariant.
pub fn is_complete(result: &TaskResult, threshold: f32) -> bool {
    match result {
        TaskResult::Failed(_) => false,
        TaskResult::Record(record) => missing_key_field_fraction(record) < threshold,
    }
}
