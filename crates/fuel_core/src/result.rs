use std::fmt;

/// Outcome kinds of fetching and mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultType {
    #[default]
    Unknown,
    Delete,
    DeleteNotFound,
    DeleteError,
    Fetch,
    FetchAlreadyExists,
    FetchNotFound,
    FetchError,
    Upload,
    UploadAlreadyExists,
    UploadError,
    Patch,
    PatchError,
}

impl ResultType {
    pub const ALL: [ResultType; 13] = [
        ResultType::Unknown,
        ResultType::Delete,
        ResultType::DeleteNotFound,
        ResultType::DeleteError,
        ResultType::Fetch,
        ResultType::FetchAlreadyExists,
        ResultType::FetchNotFound,
        ResultType::FetchError,
        ResultType::Upload,
        ResultType::UploadAlreadyExists,
        ResultType::UploadError,
        ResultType::Patch,
        ResultType::PatchError,
    ];
}

/// The closed result returned by every Fuel client operation.
///
/// Only the type is carried; the message is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FuelResult {
    kind: ResultType,
}

impl FuelResult {
    pub const fn new(kind: ResultType) -> Self {
        Self { kind }
    }

    pub fn result_type(&self) -> ResultType {
        self.kind
    }

    /// `true` for `Delete`, `Fetch`, `FetchAlreadyExists`, `Upload` and `Patch`.
    pub fn is_ok(&self) -> bool {
        matches!(
            self.kind,
            ResultType::Delete
                | ResultType::Fetch
                | ResultType::FetchAlreadyExists
                | ResultType::Upload
                | ResultType::Patch
        )
    }

    pub fn readable_result(&self) -> &'static str {
        match self.kind {
            ResultType::Delete => "Successfully deleted",
            ResultType::Fetch => "Successfully fetched from server",
            ResultType::FetchAlreadyExists => "Already in cache, did not fetch from server",
            ResultType::Upload => "Successfully uploaded to server",
            ResultType::DeleteNotFound => "Could not delete, model not found",
            ResultType::DeleteError => "Delete failed. Other errors",
            ResultType::FetchNotFound => "Model not found",
            ResultType::FetchError => "Fetch failed. Other errors",
            ResultType::UploadAlreadyExists => "Model already exists",
            ResultType::UploadError => "Upload failed. Other errors",
            ResultType::PatchError => "Patch failed.",
            ResultType::Patch => "Successfully sent patch request to the server",
            ResultType::Unknown => "Unknown result",
        }
    }
}

impl From<ResultType> for FuelResult {
    fn from(kind: ResultType) -> Self {
        Self::new(kind)
    }
}

impl From<FuelResult> for bool {
    fn from(result: FuelResult) -> Self {
        result.is_ok()
    }
}

impl fmt::Display for FuelResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.readable_result())
    }
}
