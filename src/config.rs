//! Loading of TOML configuration files describing the partitions of a NAND dump.
//!
//! A configuration names its partitions in a top-level `partitions` array; each name refers to a
//! table with `startblock`, `endblock` and `layout`. Layouts, ECC algorithms and ETFS field maps
//! may be given inline or as the name of another top-level table. Table names are matched
//! exactly first, then case-insensitively.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::{Table, Value};

use crate::ecc::BufferTransform;
use crate::error::{ensure_config, Error, Resource, Result};
use crate::nand::{EtfsLayout, Geometry, Layout, LayoutParams, PartitionSpec, Region};

/// Configurations compiled into the binary, by name
const BUILTIN_CONFIGS: &[(&str, &str)] = &[("example", include_str!("../configs/example.toml"))];

/// A `[start, end)` pair
type RawRegion = [usize; 2];

/// Either a table given in place, or the name of a top-level table
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reference<T> {
    Named(String),
    Inline(T),
}

#[derive(Debug, Deserialize)]
struct PartitionConf {
    startblock: usize,
    endblock: i64,
    layout: Reference<LayoutConf>,
}

#[derive(Debug, Deserialize)]
struct LayoutConf {
    pagesize: usize,
    oobsize: usize,
    pages_per_block: usize,
    user_data: Vec<Vec<RawRegion>>,
    #[serde(default)]
    ecc_protected_data: Vec<Vec<RawRegion>>,
    #[serde(default)]
    ecc: Vec<Vec<RawRegion>>,
    #[serde(default)]
    ecc_algorithm: Option<Reference<BchConf>>,
    #[serde(default)]
    etfs: Option<Reference<EtfsConf>>,
    #[serde(default)]
    left_shift_ecc_buf: u8,
    #[serde(default)]
    ecc_protected_data_reverse: bool,
    #[serde(default)]
    ecc_protected_data_invert: bool,
    #[serde(default)]
    ecc_reverse: bool,
    #[serde(default)]
    ecc_invert: bool,
    #[serde(default = "default_strict")]
    ecc_strict: bool,
}

fn default_strict() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BchConf {
    poly: u32,
    t: usize,
}

#[derive(Debug, Deserialize)]
struct EtfsConf {
    fid: RawRegion,
    cluster: RawRegion,
    nclusters: RawRegion,
    sequence: RawRegion,
}

fn region([start, end]: RawRegion) -> Region {
    start..end
}

fn chunks(raw: Vec<Vec<RawRegion>>) -> Vec<Vec<Region>> {
    raw.into_iter()
        .map(|chunk| chunk.into_iter().map(region).collect())
        .collect()
}

/// A fully resolved configuration: every partition with its validated layout
#[derive(Debug, Clone)]
pub struct Config {
    pub partitions: Vec<PartitionSpec>,
}

impl Config {
    /// Parse and resolve a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let table: Table = toml::from_str(text)?;
        let resolver = Resolver { table: &table };

        let names: Vec<String> = resolver.get("partitions")?.clone().try_into()?;
        for (i, name) in names.iter().enumerate() {
            ensure_config!(
                !names[..i].contains(name),
                "partition {name} is listed more than once"
            );
        }
        let partitions = names
            .iter()
            .map(|name| resolver.partition(name))
            .collect::<Result<_>>()?;

        Ok(Self { partitions })
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingResource {
                resource: Resource::Config,
                path: path.to_owned(),
            });
        }
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Load a built-in configuration by name, or else a configuration file at that path
    pub fn find(name_or_path: &str) -> Result<Self> {
        match builtin_config(name_or_path) {
            Some(text) => Self::from_toml(text),
            None => Self::load(Path::new(name_or_path)),
        }
    }

    /// Names of the configured partitions, in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.partitions.iter().map(|p| p.name.as_str())
    }
}

/// Names of every built-in configuration, sorted
pub fn builtin_configs() -> Vec<&'static str> {
    let mut names: Vec<_> = BUILTIN_CONFIGS.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    names
}

fn builtin_config(name: &str) -> Option<&'static str> {
    BUILTIN_CONFIGS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, text)| *text)
}

/// Looks up named tables in the top level of a configuration file
struct Resolver<'a> {
    table: &'a Table,
}

impl Resolver<'_> {
    fn get(&self, name: &str) -> Result<&Value> {
        self.table
            .get(name)
            .or_else(|| {
                self.table
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .ok_or_else(|| Error::config(format!("no table named {name:?}")))
    }

    fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.get(name)?
            .clone()
            .try_into()
            .map_err(|e| Error::config(format!("in {name:?}: {e}")))
    }

    fn resolve<T: DeserializeOwned>(&self, reference: Reference<T>) -> Result<T> {
        match reference {
            Reference::Inline(value) => Ok(value),
            Reference::Named(name) => self.parse(&name),
        }
    }

    fn partition(&self, name: &str) -> Result<PartitionSpec> {
        let conf: PartitionConf = self.parse(name)?;

        let end_block = match conf.endblock {
            -1 => None,
            end => {
                ensure_config!(end >= 0, "partition {name}: invalid endblock {end}");
                Some(end as usize)
            }
        };

        let layout = self
            .layout(self.resolve(conf.layout)?)
            .map_err(|e| Error::config(format!("partition {name}: {e}")))?;

        Ok(PartitionSpec {
            name: name.to_string(),
            start_block: conf.startblock,
            end_block,
            layout,
        })
    }

    fn layout(&self, conf: LayoutConf) -> Result<Layout> {
        let mut params = LayoutParams::new(Geometry {
            pagesize: conf.pagesize,
            oobsize: conf.oobsize,
            pages_per_block: conf.pages_per_block,
        });

        params.user_data = chunks(conf.user_data);
        params.protected_data = chunks(conf.ecc_protected_data);
        params.ecc = chunks(conf.ecc);
        params.data_transform = BufferTransform {
            invert: conf.ecc_protected_data_invert,
            reverse: conf.ecc_protected_data_reverse,
        };
        params.ecc_transform = BufferTransform {
            invert: conf.ecc_invert,
            reverse: conf.ecc_reverse,
        };
        params.left_shift = conf.left_shift_ecc_buf;
        params.ecc_strict = conf.ecc_strict;

        if let Some(bch) = conf.ecc_algorithm {
            let BchConf { poly, t } = self.resolve(bch)?;
            params.bch = Some((poly, t));
        }

        if let Some(etfs) = conf.etfs {
            let EtfsConf {
                fid,
                cluster,
                nclusters,
                sequence,
            } = self.resolve(etfs)?;
            params.etfs = Some(EtfsLayout {
                fid: region(fid),
                cluster: region(cluster),
                nclusters: region(nclusters),
                sequence: region(sequence),
            });
        }

        Layout::new(params)
    }
}

#[test]
fn test_builtin_example() -> anyhow::Result<()> {
    assert_eq!(builtin_configs(), ["example"]);

    let config = Config::find("example")?;
    assert_eq!(
        config.names().collect::<Vec<_>>(),
        ["RAW", "SIMPLE", "ETFS"]
    );

    let raw = &config.partitions[0];
    assert_eq!((raw.start_block, raw.end_block), (0, Some(3)));
    assert!(raw.layout.codec().is_none());
    assert_eq!(raw.layout.corrected_pagesize(), 2048);

    let simple = &config.partitions[1];
    assert_eq!(simple.layout.chunks().count(), 4);
    assert_eq!(simple.layout.codec().map(|c| c.ecc_bytes()), Some(7));
    assert!(!simple.layout.ecc_strict());

    let etfs = &config.partitions[2];
    assert_eq!(etfs.end_block, None);
    assert!(etfs.layout.ecc_strict());
    assert_eq!(etfs.layout.corrected_pagesize(), 2048 + 16);
    assert_eq!(etfs.layout.etfs().map(|e| e.fid.clone()), Some(2080..2082));
    Ok(())
}

#[test]
fn test_inline_and_defaults() -> anyhow::Result<()> {
    let config = Config::from_toml(
        r#"
        partitions = ["data"]

        [DATA]
        startblock = 1
        endblock = 2
        layout = { pagesize = 512, oobsize = 16, pages_per_block = 32, user_data = [[[0, 512]]], ecc_protected_data = [[[0, 512]]], ecc = [[[512, 519]]], ecc_algorithm = "bch", ecc_invert = true, left_shift_ecc_buf = 4 }

        [bch]
        poly = 8219
        t = 4
        "#,
    )?;

    let data = &config.partitions[0];
    assert_eq!(data.name, "data");
    assert_eq!(data.layout.blocksize(), 528 * 32);
    assert_eq!(
        data.layout.ecc_transform(),
        BufferTransform {
            invert: true,
            reverse: false
        }
    );
    assert!(data.layout.data_transform().is_identity());
    assert!(data.layout.nibble_shift());
    assert!(data.layout.ecc_strict());
    Ok(())
}

#[test]
fn test_errors() {
    let missing_layout = r#"
        partitions = ["A"]
        [A]
        startblock = 0
        endblock = 1
        layout = "NOPE"
    "#;
    assert!(matches!(
        Config::from_toml(missing_layout),
        Err(Error::Config(_))
    ));

    let bad_endblock = r#"
        partitions = ["A"]
        [A]
        startblock = 0
        endblock = -2
        layout = { pagesize = 512, oobsize = 16, pages_per_block = 32, user_data = [] }
    "#;
    assert!(matches!(
        Config::from_toml(bad_endblock),
        Err(Error::Config(_))
    ));

    let mismatched_chunks = r#"
        partitions = ["A"]
        [A]
        startblock = 0
        endblock = 1
        layout = { pagesize = 512, oobsize = 16, pages_per_block = 32, user_data = [], ecc_protected_data = [[[0, 256]], [[256, 512]]], ecc = [[[512, 519]]] }
    "#;
    assert!(matches!(
        Config::from_toml(mismatched_chunks),
        Err(Error::Config(_))
    ));

    let duplicate_name = r#"
        partitions = ["A", "B", "A"]
        [A]
        startblock = 0
        endblock = 1
        layout = { pagesize = 512, oobsize = 16, pages_per_block = 32, user_data = [[[0, 512]]] }
        [B]
        startblock = 2
        endblock = 3
        layout = { pagesize = 512, oobsize = 16, pages_per_block = 32, user_data = [[[0, 512]]] }
    "#;
    match Config::from_toml(duplicate_name) {
        Err(Error::Config(msg)) => assert!(msg.contains("more than once"), "{msg}"),
        other => panic!("expected duplicate partition error, got {other:?}"),
    }

    assert!(Config::from_toml("partitions = [").is_err());
    assert!(Config::from_toml("nothing = 1").is_err());
}

#[test]
fn test_load_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("chip.toml");

    match Config::load(&path) {
        Err(Error::MissingResource { resource, .. }) => assert_eq!(resource, Resource::Config),
        other => panic!("expected missing config, got {other:?}"),
    }

    fs::write(&path, include_str!("../configs/example.toml"))?;
    let config = Config::find(path.to_str().unwrap())?;
    assert_eq!(config.partitions.len(), 3);
    Ok(())
}
