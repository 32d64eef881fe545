//! # Persistent store
//!
//! A tagged database lives in `<home>/<TAG>/` as three files:
//!
//! | File              | Content                                                        |
//! |-------------------|----------------------------------------------------------------|
//! | `<TAG>.tag`       | Option line describing the grid and units ([`TagConfig`])      |
//! | `<TAG>_tracks.d`  | `# <TAG>` header, then `name<TAB>id<TAB>flags` sorted by name  |
//! | `<TAG>_index.b`   | `(bin, n, (id, flags){n})*`, 4-byte native-endian integers     |
//!
//! The whole database is loaded in memory, mutated, and rewritten in full by [`Store::save`].
//! The tag file is written once by [`Store::create`] and never touched again.
//!
//! Replacement sequence
//! -----------------
//! Both files are first staged: written to `<file>.tmp`, synced and marked read-only. If either
//! staging fails, the staged files are removed and the current generation is left untouched.
//! Once both are staged, each file in turn has its previous backup `<file>_old` deleted, is
//! copied to `<file>_old`, and has its temporary file renamed over it.
//!
//! Byte order
//! -----------------
//! The index is written in native byte order. On load, a negative bin id or track count in the
//! first record (read as `i32`), or a track count that only fits the file once swapped, means the
//! file comes from a machine of the other endianness and every word is byte-swapped.

use std::{
    fs::{self, File},
    io::{self, Write},
};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::{
    bins::{bin_index::BinIndex, grid::BinGrid, registry::Registry},
    constants::{
        BinId, BACKUP_SUFFIX, HOME_ENV_VAR, INDEX_SUFFIX, TAG_EXTENSION, TEMP_SUFFIX,
        TRACKS_SUFFIX,
    },
    tag::TagConfig,
    xover_errors::XoverError,
};

/// In-memory image of one tagged database.
#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    pub config: TagConfig,
    pub grid: BinGrid,
    pub registry: Registry,
    pub index: BinIndex,
}

impl Database {
    /// Empty database for a configuration.
    pub fn new(config: TagConfig) -> Result<Self, XoverError> {
        let grid = BinGrid::from_config(&config)?;
        Ok(Self {
            config,
            grid,
            registry: Registry::new(),
            index: BinIndex::new(),
        })
    }

    pub fn tag(&self) -> &str {
        &self.config.tag
    }

    /// Check id density and that the index only references registered tracks inside the grid.
    pub fn validate(&self) -> Result<(), XoverError> {
        self.registry.validate()?;
        let n_tracks = self.registry.len();
        let n_bins = self.grid.n_bins();
        for (bin, members) in self.index.iter() {
            if bin as usize >= n_bins {
                return Err(XoverError::BadBinIndex(format!(
                    "stored bin {bin} beyond the {n_bins} bins of the grid"
                )));
            }
            if let Some(m) = members.iter().find(|m| m.track_id as usize >= n_tracks) {
                return Err(XoverError::IdSpaceGap(format!(
                    "bin {bin} references track id {} but only {n_tracks} tracks are registered",
                    m.track_id
                )));
            }
        }
        Ok(())
    }
}

/// Root directory holding tagged databases.
#[derive(Debug, Clone)]
pub struct Store {
    home: Utf8PathBuf,
}

impl Store {
    pub fn new(home: impl AsRef<Utf8Path>) -> Self {
        Self {
            home: home.as_ref().to_path_buf(),
        }
    }

    /// Store rooted at `$X2SYS_HOME`, or the current directory when unset.
    pub fn from_env() -> Result<Self, XoverError> {
        let home = match std::env::var(HOME_ENV_VAR) {
            Ok(dir) => Utf8PathBuf::from(dir),
            Err(_) => Utf8PathBuf::from_path_buf(std::env::current_dir()?).map_err(|p| {
                XoverError::InvalidParameter(format!("non UTF-8 working directory {}", p.display()))
            })?,
        };
        Ok(Self { home })
    }

    pub fn home(&self) -> &Utf8Path {
        &self.home
    }

    pub fn tag_dir(&self, tag: &str) -> Utf8PathBuf {
        self.home.join(tag)
    }

    pub fn tag_file(&self, tag: &str) -> Utf8PathBuf {
        self.tag_dir(tag).join(format!("{tag}.{TAG_EXTENSION}"))
    }

    pub fn tracks_file(&self, tag: &str) -> Utf8PathBuf {
        self.tag_dir(tag).join(format!("{tag}{TRACKS_SUFFIX}"))
    }

    pub fn index_file(&self, tag: &str) -> Utf8PathBuf {
        self.tag_dir(tag).join(format!("{tag}{INDEX_SUFFIX}"))
    }

    pub fn exists(&self, tag: &str) -> bool {
        self.tag_file(tag).is_file()
    }

    /// Initialize a new tagged database with an empty registry and index.
    ///
    /// Arguments
    /// -----------------
    /// * `config` – Validated tag configuration; its `tag` names the database.
    ///
    /// Return
    /// ----------
    /// * The empty [`Database`], or [`XoverError::InvalidTag`] if the tag already exists.
    pub fn create(&self, config: TagConfig) -> Result<Database, XoverError> {
        let tag = config.tag.clone();
        if self.exists(&tag) {
            return Err(XoverError::InvalidTag(format!(
                "{tag} already exists in {}",
                self.home
            )));
        }
        let db = Database::new(config)?;
        fs::create_dir_all(self.tag_dir(&tag))?;
        fs::write(self.tag_file(&tag), db.config.to_file_content())?;
        self.save(&db)?;
        info!(
            "Created database {tag} with a {}x{} bin grid",
            db.grid.n_cols(),
            db.grid.n_rows()
        );
        Ok(db)
    }

    /// Load the tag, registry and index of a database.
    pub fn load(&self, tag: &str) -> Result<Database, XoverError> {
        let config = TagConfig::parse(tag, &fs::read_to_string(self.tag_file(tag))?)?;
        let grid = BinGrid::from_config(&config)?;
        let registry = parse_registry(&fs::read_to_string(self.tracks_file(tag))?)?;
        let index = decode_index(&fs::read(self.index_file(tag))?)?;

        let db = Database {
            config,
            grid,
            registry,
            index,
        };
        db.validate()?;
        debug!(
            "Loaded {tag}: {} tracks, {} bins",
            db.registry.len(),
            db.index.len()
        );
        Ok(db)
    }

    /// Rewrite the registry and index files of `db`.
    ///
    /// Nothing is written when [`Database::validate`] fails.
    pub fn save(&self, db: &Database) -> Result<(), XoverError> {
        db.validate()?;
        let tag = db.tag();
        fs::create_dir_all(self.tag_dir(tag))?;

        let mut registry_bytes = Vec::new();
        write_registry(&mut registry_bytes, tag, &db.registry)?;
        let files = [
            (self.tracks_file(tag), registry_bytes),
            (self.index_file(tag), encode_index(&db.index)),
        ];

        for (k, (path, bytes)) in files.iter().enumerate() {
            if let Err(e) = stage_file(path, bytes) {
                for (staged, _) in &files[..=k] {
                    discard_staged(staged);
                }
                return Err(e);
            }
        }
        for (path, _) in &files {
            commit_file(path)?;
        }

        info!(
            "Saved {tag}: {} tracks, {} bins",
            db.registry.len(),
            db.index.len()
        );
        Ok(())
    }
}

fn with_suffix(path: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{path}{suffix}"))
}

fn remove_if_present(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Write `bytes` to the temporary sibling of `path`, synced and read-only.
fn stage_file(path: &Utf8Path, bytes: &[u8]) -> Result<(), XoverError> {
    let tmp = with_suffix(path, TEMP_SUFFIX);
    remove_if_present(&tmp)?;
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    let mut perms = fs::metadata(&tmp)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(&tmp, perms)?;
    Ok(())
}

fn discard_staged(path: &Utf8Path) {
    let tmp = with_suffix(path, TEMP_SUFFIX);
    if let Err(e) = remove_if_present(&tmp) {
        warn!("Could not remove {tmp}: {e}");
    }
}

/// Keep one backup of `path` and move its staged file over it.
fn commit_file(path: &Utf8Path) -> Result<(), XoverError> {
    let backup = with_suffix(path, BACKUP_SUFFIX);
    if path.is_file() {
        remove_if_present(&backup)?;
        fs::copy(path, &backup)?;
    }
    fs::rename(with_suffix(path, TEMP_SUFFIX), path)?;
    Ok(())
}

// -------------------------------------------------------------------------------------------------
// Registry text
// -------------------------------------------------------------------------------------------------

pub fn write_registry<W: Write>(out: &mut W, tag: &str, registry: &Registry) -> io::Result<()> {
    writeln!(out, "# {tag}")?;
    for entry in registry.iter() {
        writeln!(out, "{entry}")?;
    }
    Ok(())
}

/// Parse a registry file. The first line is a header and is skipped.
pub fn parse_registry(content: &str) -> Result<Registry, XoverError> {
    let mut registry = Registry::new();
    for (line_no, line) in content.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let malformed = |reason: &str| XoverError::MalformedRecord {
            line: line_no + 1,
            reason: format!("{reason}: {line}"),
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, id, flags] = fields.as_slice() else {
            return Err(malformed("expected `name id flags`"));
        };
        let id = id.parse().map_err(|_| malformed("bad track id"))?;
        let flags = flags.parse().map_err(|_| malformed("bad flags"))?;
        registry.insert_sorted(name, id, flags)?;
    }
    Ok(registry)
}

// -------------------------------------------------------------------------------------------------
// Binary index
// -------------------------------------------------------------------------------------------------

/// Serialize the index as native-endian `u32` records.
pub fn encode_index(index: &BinIndex) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 * index.len() + 8 * index.n_memberships());
    for (bin, members) in index.iter() {
        bytes.extend_from_slice(&bin.to_ne_bytes());
        bytes.extend_from_slice(&(members.len() as u32).to_ne_bytes());
        for m in members {
            bytes.extend_from_slice(&m.track_id.to_ne_bytes());
            bytes.extend_from_slice(&m.flags.to_ne_bytes());
        }
    }
    bytes
}

/// Deserialize an index written by [`encode_index`] on either endianness.
pub fn decode_index(bytes: &[u8]) -> Result<BinIndex, XoverError> {
    if bytes.len() % 4 != 0 {
        return Err(XoverError::MalformedRecord {
            line: 0,
            reason: format!("index size {} is not a multiple of 4 bytes", bytes.len()),
        });
    }
    let raw: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let fits = |count: u32| 2 + 2 * count as usize <= raw.len();
    let swap = raw.len() >= 2
        && ((raw[0] as i32) < 0
            || (raw[1] as i32) < 0
            || (!fits(raw[1]) && fits(raw[1].swap_bytes())));
    if swap {
        debug!("Index written with the other byte order, swapping");
    }
    let word = |k: usize| if swap { raw[k].swap_bytes() } else { raw[k] };

    let truncated = |at: usize| XoverError::MalformedRecord {
        line: 0,
        reason: format!("index truncated at word {at}"),
    };

    let mut index = BinIndex::new();
    let mut k = 0;
    while k < raw.len() {
        if k + 2 > raw.len() {
            return Err(truncated(k));
        }
        let bin: BinId = word(k);
        let count = word(k + 1) as usize;
        k += 2;
        if k + 2 * count > raw.len() {
            return Err(truncated(k));
        }
        for pair in 0..count {
            index.add_track_to_bin(bin, word(k + 2 * pair), word(k + 2 * pair + 1));
        }
        k += 2 * count;
    }
    Ok(index)
}

#[cfg(test)]
mod store_tests {
    use super::*;
    use crate::tag::{LonConvention, Region};

    fn config(tag: &str) -> TagConfig {
        TagConfig::builder(tag)
            .format("xyz")
            .geographic(LonConvention::ZeroTo360)
            .region(Region::GLOBAL_360)
            .build()
            .unwrap()
    }

    fn sample_index() -> BinIndex {
        let mut idx = BinIndex::new();
        idx.add_track_to_bin(10, 1, 3);
        idx.add_track_to_bin(10, 0, 1);
        idx.add_track_to_bin(64_000, 0, 2);
        idx
    }

    #[test]
    fn test_index_codec_and_byte_swap() {
        let idx = sample_index();
        let bytes = encode_index(&idx);
        assert_eq!(bytes.len(), 4 * (2 + 4 + 2 + 2));
        assert_eq!(decode_index(&bytes).unwrap(), idx);

        let swapped: Vec<u8> = bytes
            .chunks_exact(4)
            .flat_map(|c| [c[3], c[2], c[1], c[0]])
            .collect();
        assert_eq!(decode_index(&swapped).unwrap(), idx);
    }

    #[test]
    fn test_truncated_index() {
        let bytes = encode_index(&sample_index());
        assert!(matches!(
            decode_index(&bytes[..bytes.len() - 4]),
            Err(XoverError::MalformedRecord { .. })
        ));
        assert!(matches!(
            decode_index(&bytes[..6]),
            Err(XoverError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_registry_text() {
        let mut reg = Registry::new();
        reg.insert_sorted("beta", 1, 5).unwrap();
        reg.insert_sorted("alpha", 0, 1).unwrap();

        let mut out = Vec::new();
        write_registry(&mut out, "DEMO", &reg).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "# DEMO\nalpha\t0\t1\nbeta\t1\t5\n");
        assert_eq!(parse_registry(&text).unwrap(), reg);

        assert!(matches!(
            parse_registry("# DEMO\nalpha 0\n"),
            Err(XoverError::MalformedRecord { line: 2, .. })
        ));
    }

    #[test]
    fn test_create_save_load_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let home = Utf8Path::from_path(dir.path()).unwrap();
        let store = Store::new(home);

        let mut db = store.create(config("DEMO")).unwrap();
        assert!(store.exists("DEMO"));
        assert!(matches!(
            store.create(config("DEMO")),
            Err(XoverError::InvalidTag(_))
        ));

        db.registry.insert_sorted("alpha", 0, 3).unwrap();
        db.registry.insert_sorted("beta", 1, 3).unwrap();
        db.index = sample_index();
        store.save(&db).unwrap();

        let loaded = store.load("DEMO").unwrap();
        assert_eq!(loaded, db);

        let backup = with_suffix(&store.tracks_file("DEMO"), BACKUP_SUFFIX);
        assert_eq!(fs::read_to_string(backup).unwrap(), "# DEMO\n");
        assert!(!with_suffix(&store.index_file("DEMO"), TEMP_SUFFIX).exists());
    }

    #[test]
    fn test_failed_save_keeps_current_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(Utf8Path::from_path(dir.path()).unwrap());
        let mut db = store.create(config("DEMO")).unwrap();
        db.registry.insert_sorted("alpha", 0, 3).unwrap();
        db.registry.insert_sorted("beta", 1, 3).unwrap();
        db.index = sample_index();
        store.save(&db).unwrap();
        let tracks_before = fs::read(store.tracks_file("DEMO")).unwrap();

        // the index cannot be staged while a directory occupies its temporary path
        let index_tmp = with_suffix(&store.index_file("DEMO"), TEMP_SUFFIX);
        fs::create_dir(&index_tmp).unwrap();
        let emptied = Database::new(config("DEMO")).unwrap();
        assert!(matches!(store.save(&emptied), Err(XoverError::IoError(_))));

        assert_eq!(fs::read(store.tracks_file("DEMO")).unwrap(), tracks_before);
        assert!(!with_suffix(&store.tracks_file("DEMO"), TEMP_SUFFIX).exists());
        assert_eq!(store.load("DEMO").unwrap(), db);

        fs::remove_dir(&index_tmp).unwrap();
        store.save(&emptied).unwrap();
        assert!(store.load("DEMO").unwrap().registry.is_empty());
    }

    #[test]
    fn test_truncated_member_list() {
        // bin 7 announces two members but carries one
        let words: [u32; 4] = [7, 2, 0, 1];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        match decode_index(&bytes) {
            Err(XoverError::MalformedRecord { reason, .. }) => {
                assert_eq!(reason, "index truncated at word 2")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_save_rejects_dangling_track_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(Utf8Path::from_path(dir.path()).unwrap());
        let mut db = store.create(config("DEMO")).unwrap();
        db.index.add_track_to_bin(5, 0, 1);

        assert!(matches!(store.save(&db), Err(XoverError::IdSpaceGap(_))));
        assert!(store.load("DEMO").unwrap().index.is_empty());
    }
}
