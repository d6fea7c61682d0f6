//! Locally imported episodes and file-name style title comparison

use super::table::Record;
use super::{Database, StorageError};
use crate::matching::LocalEpisodeLookup;
use crate::model::{LocalEpisode, LocalEpisodeInsert};

impl Record for LocalEpisodeInsert {
    type Key = String;

    fn natural_key(&self) -> Self::Key {
        self.title.clone()
    }
}

impl Database {
    /// Stores imported comments under `title`, replacing a previous import
    /// of the same title
    pub fn import_local_episode(
        &self,
        episode: LocalEpisodeInsert,
    ) -> Result<LocalEpisode, StorageError> {
        self.local_episodes.upsert(episode)
    }

    pub fn local_episodes(&self) -> Result<Vec<LocalEpisode>, StorageError> {
        self.local_episodes.filter(|_| true)
    }
}

impl LocalEpisodeLookup for Database {
    fn match_local_by_title(&self, title: &str) -> Result<Option<LocalEpisode>, StorageError> {
        Ok(self
            .local_episodes
            .filter(|episode| filename_matches(title, &episode.title))?
            .into_iter()
            .next())
    }
}

/// Compares two titles the way file names are compared
///
/// Only the last path segment counts, the extension is ignored and case does
/// not matter, so `foo.mp4` matches `path/to/foo.mkv`.
///
/// Nothing here knows which show a title belongs to: two shows that both
/// name their files `Episode 01` match each other.
pub fn filename_matches(observed: &str, stored: &str) -> bool {
    let observed = file_stem(observed);
    !observed.is_empty() && observed == file_stem(stored)
}

/// Lowercased last path segment without its extension
fn file_stem(title: &str) -> String {
    let tail = title
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(title)
        .trim();

    let stem = match tail.rsplit_once('.') {
        Some((stem, extension)) if is_extension(extension) && !stem.is_empty() => stem,
        _ => tail,
    };

    stem.trim().to_lowercase()
}

/// An extension is a short alphanumeric suffix containing at least one
/// letter, so `Vol. 2` or `Ep.10` keep their dot.
fn is_extension(candidate: &str) -> bool {
    (1..=5).contains(&candidate.len())
        && candidate.chars().all(|c| c.is_ascii_alphanumeric())
        && candidate.chars().any(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("foo.mp4"), "foo");
        assert_eq!(file_stem("path/to/Foo.MKV"), "foo");
        assert_eq!(file_stem("C:\\Videos\\Show - 01.avi"), "show - 01");
        assert_eq!(file_stem("Show Vol. 2"), "show vol. 2");
        assert_eq!(file_stem("Show Ep.10"), "show ep.10");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn test_filename_matches() {
        assert!(filename_matches("foo.mp4", "path/to/foo.mkv"));
        assert!(filename_matches("FOO", "foo.xml"));
        assert!(filename_matches("dir/Show A - 03.mkv", "Show A - 03"));
        assert!(!filename_matches("foo", "foobar.mkv"));
        assert!(!filename_matches("", "foo.mkv"));
    }

    #[test]
    fn test_filename_match_is_not_scoped_by_show() {
        // Known ambiguity: identically named files of different shows match
        assert!(filename_matches(
            "/anime/Show A/Episode 01.mkv",
            "/anime/Show B/Episode 01.mp4"
        ));
    }

    #[test]
    fn test_match_local_by_title() {
        let db = Database::in_memory();
        db.import_local_episode(LocalEpisodeInsert::new("downloads/Show A - 01.mkv", Vec::new()))
            .unwrap();

        let hit = db.match_local_by_title("Show A - 01.mp4").unwrap();
        assert_eq!(hit.unwrap().title, "downloads/Show A - 01.mkv");
        assert!(db.match_local_by_title("Show A - 02").unwrap().is_none());
    }
}
