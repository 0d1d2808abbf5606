use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::media::types::is_hidden;

/// One audio/video pair to dub, identified by its title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineItem {
    pub title: String,
    pub audio_path: PathBuf,
    pub video_path: PathBuf,
    pub output_dir: PathBuf,
}

impl PipelineItem {
    /// Title for an audio file name: the stem before the final extension.
    ///
    /// Names without an extension, or with an empty stem, have no title.
    pub fn title_from_file_name(name: &str) -> Option<String> {
        let (stem, extension) = name.rsplit_once('.')?;
        if stem.is_empty() || extension.is_empty() {
            return None;
        }
        Some(stem.to_string())
    }

    /// Build the item for an audio file, pairing it with
    /// `<video_dir>/<title>.<video_extension>`
    pub fn from_audio_path(config: &Config, audio_path: &Path) -> Option<Self> {
        let name = audio_path.file_name()?.to_str()?;
        let title = Self::title_from_file_name(name)?;

        let video_name = format!("{}.{}", title, config.paths.video_extension);
        Some(Self {
            video_path: config.video_dir().join(video_name),
            output_dir: config.output_dir().join(&title),
            audio_path: audio_path.to_path_buf(),
            title,
        })
    }

    /// Lip-synced video written by the first stage
    pub fn lipsync_output(&self) -> PathBuf {
        self.output_dir.join("result.mp4")
    }

    /// Extracted frames
    pub fn frames_dir(&self) -> PathBuf {
        self.output_dir.join("frames")
    }

    /// Output directory handed to the restoration tool
    pub fn restored_dir(&self) -> PathBuf {
        self.output_dir.join("restored_imgs")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join("concat.txt")
    }

    pub fn concat_output(&self) -> PathBuf {
        self.output_dir.join("concated_output.mp4")
    }

    /// The deliverable
    pub fn final_output(&self) -> PathBuf {
        self.output_dir.join("final_with_audio.mp4")
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("report.json")
    }
}

/// List the audio input directory and build one item per audio file.
///
/// Items come back sorted by file name. Files without a usable title are
/// skipped; a missing paired video is only warned about.
pub fn discover_items(config: &Config) -> Result<Vec<PipelineItem>> {
    let audio_dir = config.audio_dir();
    if !audio_dir.is_dir() {
        return Err(PipelineError::InputDirMissing { path: audio_dir }.into());
    }

    let mut audio_files: Vec<PathBuf> = std::fs::read_dir(&audio_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && !is_hidden(path))
        .collect();
    audio_files.sort();

    let mut items = Vec::with_capacity(audio_files.len());
    for path in audio_files {
        match PipelineItem::from_audio_path(config, &path) {
            Some(item) => {
                if !item.video_path.is_file() {
                    warn!("No source video for '{}' at {:?}", item.title, item.video_path);
                }
                debug!("Discovered '{}' ({:?})", item.title, item.audio_path);
                items.push(item);
            }
            None => warn!("Skipping {:?}: cannot derive a title from its name", path),
        }
    }

    info!("Discovered {} item(s) in {:?}", items.len(), audio_dir);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_at(root: &Path) -> Config {
        let mut config = Config::default();
        config.paths.root = root.to_path_buf();
        config
    }

    #[test]
    fn test_title_is_stem_before_last_extension() {
        assert_eq!(PipelineItem::title_from_file_name("alice.wav").as_deref(), Some("alice"));
        assert_eq!(
            PipelineItem::title_from_file_name("take.two.mp3").as_deref(),
            Some("take.two")
        );
        assert_eq!(PipelineItem::title_from_file_name("noextension"), None);
        assert_eq!(PipelineItem::title_from_file_name("trailing."), None);
    }

    #[test]
    fn test_item_layout() {
        let config = config_at(Path::new("/work"));
        let item = PipelineItem::from_audio_path(&config, Path::new("/work/inputs/source_audio/alice.wav"))
            .unwrap();

        assert_eq!(item.title, "alice");
        assert_eq!(item.video_path, PathBuf::from("/work/inputs/source_video/alice.mp4"));
        assert_eq!(item.lipsync_output(), PathBuf::from("/work/outputs/alice/result.mp4"));
        assert_eq!(item.frames_dir(), PathBuf::from("/work/outputs/alice/frames"));
        assert_eq!(item.manifest_path(), PathBuf::from("/work/outputs/alice/concat.txt"));
        assert_eq!(
            item.final_output(),
            PathBuf::from("/work/outputs/alice/final_with_audio.mp4")
        );
    }

    #[test]
    fn test_discover_items_sorted_and_filtered() {
        let root = tempdir().unwrap();
        let audio_dir = root.path().join("inputs/source_audio");
        std::fs::create_dir_all(&audio_dir).unwrap();
        for name in ["bob.wav", "alice.wav", ".hidden.wav", "README"] {
            std::fs::write(audio_dir.join(name), b"x").unwrap();
        }
        std::fs::create_dir(audio_dir.join("nested.dir")).unwrap();

        let items = discover_items(&config_at(root.path())).unwrap();
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["alice", "bob"]);
    }

    #[test]
    fn test_discover_items_requires_audio_dir() {
        let root = tempdir().unwrap();
        assert!(discover_items(&config_at(root.path())).is_err());
    }
}
