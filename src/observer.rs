//! 진행률/완료/실패 콜백

use bytes::Bytes;

use crate::progress::ProgressSample;
use crate::Error;

pub type ProgressCallback = Box<dyn FnMut(&ProgressSample) + Send>;
pub type CompleteCallback = Box<dyn FnMut(Bytes, &str) + Send>;
pub type FailedCallback = Box<dyn FnMut(&Error) + Send>;

/// 세션 관찰자 모음
#[derive(Default)]
pub struct Observers {
    progress: Option<ProgressCallback>,
    complete: Option<CompleteCallback>,
    failed: Option<FailedCallback>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_progress(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    pub fn set_complete(&mut self, callback: CompleteCallback) {
        self.complete = Some(callback);
    }

    pub fn set_failed(&mut self, callback: FailedCallback) {
        self.failed = Some(callback);
    }

    pub(crate) fn progress(&mut self, sample: &ProgressSample) {
        if let Some(callback) = self.progress.as_mut() {
            callback(sample);
        }
    }

    pub(crate) fn complete(&mut self, data: Bytes, file_name: &str) {
        if let Some(callback) = self.complete.as_mut() {
            callback(data, file_name);
        }
    }

    pub(crate) fn failed(&mut self, error: &Error) {
        if let Some(callback) = self.failed.as_mut() {
            callback(error);
        }
    }
}
