#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BarColor {
    #[default]
    CYAN,
    GREEN,
    RED,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub records: u64,
    pub worker_id: usize,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, records: u64, worker_id: usize, color: BarColor) -> Self {
        Self {
            progress,
            records,
            worker_id,
            color,
        }
    }
}
