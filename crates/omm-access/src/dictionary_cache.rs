//! Connection-local data dictionary served to dictionary requests that name
//! no service.
//!
//! The cache only holds what the embedding application hands it. Loading from
//! a file or a provider is the dictionary subsystem's job.

use omm_core::config::{DictionaryConfig, EnumEntry, FieldEntry};
use serde_json::json;

pub const RWF_FLD_NAME: &str = "RWFFld";
pub const RWF_ENUM_NAME: &str = "RWFEnum";

/// Which dictionary a request names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryName {
    Field,
    Enum,
}

impl DictionaryName {
    /// Parse a request name. Only `RWFFld` and `RWFEnum` are valid.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            RWF_FLD_NAME => Some(Self::Field),
            RWF_ENUM_NAME => Some(Self::Enum),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Field => RWF_FLD_NAME,
            Self::Enum => RWF_ENUM_NAME,
        }
    }
}

/// One encoded refresh part.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryPart {
    pub payload: serde_json::Value,
    pub part_num: u16,
    pub complete: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DictionaryCache {
    fields: Vec<FieldEntry>,
    enums: Vec<EnumEntry>,
}

impl DictionaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &DictionaryConfig) -> Self {
        let mut cache = Self::new();
        cache.load(cfg.fields.clone(), cfg.enums.clone());
        cache
    }

    /// Replace the cached content. Fields are kept in fid order.
    pub fn load(&mut self, mut fields: Vec<FieldEntry>, enums: Vec<EnumEntry>) {
        fields.sort_by_key(|f| f.fid);
        self.fields = fields;
        self.enums = enums;
    }

    /// The field dictionary is required before either dictionary is served.
    pub fn is_loaded(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }

    /// Part `part_num` of `name`, at most `part_size` entries long.
    ///
    /// Returns `None` once `part_num` is past the last part. An empty
    /// dictionary still yields one complete, empty part.
    pub fn part(&self, name: DictionaryName, part_num: u16, part_size: usize) -> Option<DictionaryPart> {
        let part_size = part_size.max(1);
        let total = match name {
            DictionaryName::Field => self.fields.len(),
            DictionaryName::Enum => self.enums.len(),
        };
        let start = usize::from(part_num) * part_size;
        if start > total || (start == total && total != 0) {
            return None;
        }
        let end = (start + part_size).min(total);
        let entries = match name {
            DictionaryName::Field => json!(self.fields[start..end]),
            DictionaryName::Enum => json!(self.enums[start..end]),
        };
        Some(DictionaryPart {
            payload: json!({ "name": name.as_str(), "entries": entries }),
            part_num,
            complete: end == total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(fid: i16) -> FieldEntry {
        FieldEntry {
            fid,
            acronym: format!("F{fid}"),
            rwf_type: "REAL".into(),
        }
    }

    #[test]
    fn names() {
        assert_eq!(DictionaryName::parse("RWFFld"), Some(DictionaryName::Field));
        assert_eq!(DictionaryName::parse("RWFEnum"), Some(DictionaryName::Enum));
        assert_eq!(DictionaryName::parse("rwffld"), None);
    }

    #[test]
    fn parts_split_by_size() {
        let mut cache = DictionaryCache::new();
        assert!(!cache.is_loaded());
        cache.load(vec![field(25), field(22), field(-3)], vec![]);
        assert!(cache.is_loaded());

        let p0 = cache.part(DictionaryName::Field, 0, 2).unwrap();
        assert!(!p0.complete);
        assert_eq!(p0.payload["entries"][0]["fid"], -3);
        let p1 = cache.part(DictionaryName::Field, 1, 2).unwrap();
        assert!(p1.complete);
        assert_eq!(p1.payload["entries"].as_array().unwrap().len(), 1);
        assert!(cache.part(DictionaryName::Field, 2, 2).is_none());
    }

    #[test]
    fn empty_enum_table_is_one_complete_part() {
        let mut cache = DictionaryCache::new();
        cache.load(vec![field(1)], vec![]);
        let p = cache.part(DictionaryName::Enum, 0, 10).unwrap();
        assert!(p.complete);
        assert!(cache.part(DictionaryName::Enum, 1, 10).is_none());
    }
}
