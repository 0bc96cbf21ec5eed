use crate::migration::error::{MigrationError, MigrationErrorKind};
use crate::migration::naming::{self, MigrationFile};

use std::path::Path;


/// Lists the migration files in `directory`, in directory order
/// (ascending sequence, then file name).
///
/// Compiled artifacts are dropped unless `include_compiled_artifacts` is set.
/// Any other entry that does not follow the naming convention fails the whole call.
pub async fn collect(
    directory: &Path,
    include_compiled_artifacts: bool,
) -> Result<Vec<MigrationFile>, MigrationError> {
    let access_error = |source| MigrationError::new(MigrationErrorKind::DirectoryAccess {
        path: directory.to_path_buf(),
        source,
    });

    let directory = tokio::fs::canonicalize(directory).await.map_err(access_error)?;
    let mut entries = tokio::fs::read_dir(&directory).await.map_err(access_error)?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(access_error)? {
        let name = entry.file_name().to_string_lossy().into_owned();

        if naming::is_compiled_artifact_name(&name) && !include_compiled_artifacts {
            tracing::trace!("Skipping compiled artifact: {name}");
            continue;
        }

        let valid = naming::is_source_migration_name(&name)
            || (include_compiled_artifacts && naming::is_compiled_artifact_name(&name));
        let file = match valid.then(|| MigrationFile::parse(&entry.path())).flatten() {
            Some(file) => file,
            None => {
                return Err(MigrationError::new(MigrationErrorKind::NamingViolation {
                    directory: directory.clone(),
                    name,
                }))
            }
        };

        files.push(file);
    }

    files.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.path.cmp(&b.path)));
    tracing::debug!("Collected {} file(s) from {:?}", files.len(), directory);

    Ok(files)
}
