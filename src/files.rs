use std::path::Path;

use chrono::Local;
use uuid::Uuid;

/// `<timestamp>_<random>_<stem>.<extension>`, unique enough for upload and
/// chart directories shared by concurrent requests.
pub fn unique_file_name(stem: &str, extension: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();

    format!(
        "{}_{}_{}.{}",
        Local::now().format("%Y%m%d%H%M%S"),
        &random[..8],
        stem,
        extension
    )
}

/// Name under which an uploaded file is stored. Only the final component of
/// the client supplied name is kept.
pub fn upload_file_name(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("upload");
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

    unique_file_name(stem, extension)
}
