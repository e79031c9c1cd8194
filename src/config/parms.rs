//! Key-value parameter file.
//!
//! A flat TOML table. Keys are case-insensitive. Every lookup is recorded,
//! so that keys which were never read (usually misspellings) can be
//! reported once setup is complete.
//!
//! ```toml
//! pixwidth        = 0.442       # bare numbers are centimetres
//! cor2col         = "21.3 cm"   # or give the units explicitly
//! iterations      = 4
//! model           = "ad"
//! save_iterations = "2/1, 10/5"
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use toml::Value;
use units::{Length, cm, parse_length};

use crate::{Error, Result};

/// A parameter value, and whether it was present in the file
#[derive(Clone, Debug, PartialEq)]
pub struct Parm<T> {
    pub value: T,
    pub found: bool,
}

impl<T> Parm<T> {
    fn found(value: T) -> Self { Self { value, found: true  } }
    fn absent(value: T) -> Self { Self { value, found: false } }
}

#[derive(Debug)]
pub struct Parms {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
    used: RefCell<BTreeSet<String>>,
}

impl Parms {

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(Error::io(path))?;
        Self::parse(&text, path)
    }

    /// Parse `text`, reporting errors as occurring in `origin`
    pub fn parse(text: &str, origin: impl Into<PathBuf>) -> Result<Self> {
        let path = origin.into();
        let table: toml::value::Table = toml::from_str(text)
            .map_err(|source| Error::Parms { path: path.clone(), source })?;
        let mut entries = BTreeMap::new();
        for (key, value) in table {
            let lower = key.to_lowercase();
            if entries.insert(lower.clone(), value).is_some() {
                return Err(Error::illegal("Parms", format!(
                    "`{}` sets `{lower}` more than once (keys are case-insensitive)", path.display())));
            }
        }
        log::debug!("read {} parameters from {}", entries.len(), path.display());
        Ok(Self { path, entries, used: RefCell::new(BTreeSet::new()) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn lookup(&self, key: &str) -> (String, Option<&Value>) {
        let key = key.to_lowercase();
        self.used.borrow_mut().insert(key.clone());
        let value = self.entries.get(&key);
        (key, value)
    }

    fn wrong_type(key: String, expected: &'static str, found: &Value) -> Error {
        Error::ParmType { key, expected, found: found.to_string() }
    }

    pub fn int(&self, key: &str, default: i64) -> Result<Parm<i64>> {
        match self.lookup(key) {
            (_  , None                    ) => Ok(Parm::absent(default)),
            (_  , Some(Value::Integer(n))) => Ok(Parm::found(*n)),
            (key, Some(other)             ) => Err(Self::wrong_type(key, "an integer", other)),
        }
    }

    /// Like `int`, but rejecting negative values
    pub fn count(&self, key: &str, default: usize) -> Result<Parm<usize>> {
        let Parm { value, found } = self.int(key, default as i64)?;
        let value = usize::try_from(value).map_err(|_| Error::ParmType {
            key: key.to_lowercase(), expected: "a non-negative integer", found: value.to_string()
        })?;
        Ok(Parm { value, found })
    }

    pub fn double(&self, key: &str, default: f64) -> Result<Parm<f64>> {
        match self.lookup(key) {
            (_  , None                    ) => Ok(Parm::absent(default)),
            (_  , Some(Value::Float  (x))) => Ok(Parm::found(*x)),
            (_  , Some(Value::Integer(n))) => Ok(Parm::found(*n as f64)),
            (key, Some(other)             ) => Err(Self::wrong_type(key, "a number", other)),
        }
    }

    pub fn string(&self, key: &str, default: &str) -> Result<Parm<String>> {
        match self.lookup(key) {
            (_  , None                   ) => Ok(Parm::absent(default.to_string())),
            (_  , Some(Value::String(s))) => Ok(Parm::found(s.clone())),
            (key, Some(other)            ) => Err(Self::wrong_type(key, "a string", other)),
        }
    }

    /// Accepts `true`/`false`, or an integer (non-zero is true)
    pub fn bool(&self, key: &str, default: bool) -> Result<Parm<bool>> {
        match self.lookup(key) {
            (_  , None                    ) => Ok(Parm::absent(default)),
            (_  , Some(Value::Boolean(b))) => Ok(Parm::found(*b)),
            (_  , Some(Value::Integer(n))) => Ok(Parm::found(*n != 0)),
            (key, Some(other)             ) => Err(Self::wrong_type(key, "a boolean", other)),
        }
    }

    /// Bare numbers are centimetres; strings must carry their units
    pub fn length(&self, key: &str, default: Length) -> Result<Parm<Length>> {
        match self.lookup(key) {
            (_  , None                    ) => Ok(Parm::absent(default)),
            (_  , Some(Value::Float  (x))) => Ok(Parm::found(cm(*x as f32))),
            (_  , Some(Value::Integer(n))) => Ok(Parm::found(cm(*n as f32))),
            (key, Some(Value::String (s))) => parse_length(s)
                .map(Parm::found)
                .map_err(|_| Error::ParmType { key, expected: "a length", found: s.clone() }),
            (key, Some(other)             ) => Err(Self::wrong_type(key, "a length", other)),
        }
    }

    /// Keys present in the file which have not been looked up
    pub fn unused(&self) -> Vec<String> {
        let used = self.used.borrow();
        self.entries.keys()
            .filter(|key| !used.contains(*key))
            .cloned()
            .collect()
    }
}
