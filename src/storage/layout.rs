use std::fs;
use std::path::{Path, PathBuf};
use crate::core::error::Result;

const SEGMENT_PREFIX: &str = "segment_";
const SEGMENT_EXTENSION: &str = "seg";

/// Directory structure for index files
///
/// ```text
/// <base>/.lock
/// <base>/segment_00000003.seg
/// <base>/CommitPoints/00000001/index.commitPoint
/// <base>/CommitPoints/00000001/segment_00000001.seg
/// <base>/Facets/<setup id>.json
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
    pub commit_points_dir: PathBuf,
    pub facets_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let commit_points_dir = base_dir.join("CommitPoints");
        let facets_dir = base_dir.join("Facets");

        fs::create_dir_all(&base_dir)?;
        fs::create_dir_all(&commit_points_dir)?;
        fs::create_dir_all(&facets_dir)?;

        Ok(StorageLayout {
            base_dir,
            commit_points_dir,
            facets_dir,
        })
    }

    pub fn segment_file_name(generation: u64) -> String {
        format!("{}{:08}.{}", SEGMENT_PREFIX, generation, SEGMENT_EXTENSION)
    }

    /// Generation encoded in a segment file name
    pub fn parse_segment_file_name(name: &str) -> Option<u64> {
        name.strip_prefix(SEGMENT_PREFIX)?
            .strip_suffix(SEGMENT_EXTENSION)?
            .strip_suffix('.')?
            .parse()
            .ok()
    }

    pub fn segment_path(&self, generation: u64) -> PathBuf {
        self.base_dir.join(Self::segment_file_name(generation))
    }

    pub fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    /// Generations of the live segment files, ascending
    pub fn list_segment_generations(&self) -> Result<Vec<u64>> {
        let mut generations = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(generation) = entry.file_name().to_str().and_then(Self::parse_segment_file_name) {
                generations.push(generation);
            }
        }
        generations.sort_unstable();
        Ok(generations)
    }

    /// Leftover `*.tmp` files of interrupted writes, in the base directory
    /// and the facet setup directory
    pub fn list_temp_files(&self) -> Result<Vec<PathBuf>> {
        let mut temps = Vec::new();
        for dir in [&self.base_dir, &self.facets_dir] {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_file() && path.extension().is_some_and(|ext| ext == "tmp") {
                    temps.push(path);
                }
            }
        }
        temps.sort();
        Ok(temps)
    }
}

/// fsync a directory so a rename inside it is durable
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_names_round_trip() {
        let name = StorageLayout::segment_file_name(42);
        assert_eq!(name, "segment_00000042.seg");
        assert_eq!(StorageLayout::parse_segment_file_name(&name), Some(42));
        assert_eq!(StorageLayout::parse_segment_file_name("segment_00000042.seg.tmp"), None);
        assert_eq!(StorageLayout::parse_segment_file_name("index.commitPoint"), None);
    }

    #[test]
    fn lists_only_segment_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path()).unwrap();
        fs::write(layout.segment_path(3), b"x").unwrap();
        fs::write(layout.segment_path(1), b"x").unwrap();
        fs::write(StorageLayout::temp_path(&layout.segment_path(4)), b"x").unwrap();

        assert_eq!(layout.list_segment_generations().unwrap(), vec![1, 3]);
        assert_eq!(layout.list_temp_files().unwrap().len(), 1);
        assert!(layout.commit_points_dir.is_dir());
    }

    #[test]
    fn other_extensions_are_not_segments() {
        assert_eq!(StorageLayout::parse_segment_file_name("segment_00000042.segx"), None);
        assert_eq!(StorageLayout::parse_segment_file_name("segment_00000042seg"), None);
        assert_eq!(StorageLayout::parse_segment_file_name("segment_00000042.json"), None);
    }

    #[test]
    fn temp_files_of_facet_setups_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path()).unwrap();
        let setup_temp = StorageLayout::temp_path(&layout.facets_dir.join("facets%2FEmployees.json"));
        fs::write(&setup_temp, b"{").unwrap();
        fs::write(StorageLayout::temp_path(&layout.segment_path(2)), b"x").unwrap();

        let temps = layout.list_temp_files().unwrap();
        assert_eq!(temps.len(), 2);
        assert!(temps.contains(&setup_temp));
    }
}
