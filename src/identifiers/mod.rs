//! Identifier table loading

pub mod loader;
pub mod table;

pub use loader::{
    is_valid_identifier, list_columns, load_from_path, load_site_groups, normalize_identifier,
    IdentifierKind, MatchTag, SiteGroup, SiteGroups,
};
pub use table::Table;
