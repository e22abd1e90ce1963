//! Shared listing schema descriptor.
//!
//! The original pipeline detected identity columns by their `_id` name
//! suffix and kept separate copies of the column list in the extraction
//! query and the destination table definition. Here a single declared
//! [`ListingSchema`] is consumed by all three interested parties:
//!
//! - the extractor builds its SELECT projection from [`ListingSchema::select_sql`],
//! - the transformer derives its identity/flag/eligible column sets from
//!   the declared roles,
//! - the loader targets [`ListingSchema::insert_sql`]'s field list.

use once_cell::sync::Lazy;

/// Name of the price column, the target of the downstream prediction task.
pub const PRICE: &str = "price";

/// The fixed listing schema shared by extraction, transformation and load.
pub static LISTING_SCHEMA: Lazy<ListingSchema> = Lazy::new(ListingSchema::listing);

/// Role of a column in the cleaning semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Row identification. Excluded from deduplication and anomaly checks.
    Identity,
    /// Categorical string. Excluded from anomaly checks.
    Categorical,
    /// Plain integer attribute.
    Integer,
    /// Floating point attribute.
    Float,
    /// Boolean-like attribute, coerced to 0/1 integers before load.
    Flag,
}

/// Side of the source join a column originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOrigin {
    Buildings,
    Flats,
}

/// A single column of the wide listing record.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: &'static str,
    pub role: ColumnRole,
    pub origin: ColumnOrigin,
    /// SQL expression projecting this column in the extraction query.
    /// `b` aliases the buildings relation, `f` the flats relation.
    select_expr: &'static str,
    /// Whether the column survives into the destination table.
    pub persisted: bool,
}

/// Declared column list of the listing record set.
#[derive(Debug, Clone)]
pub struct ListingSchema {
    columns: Vec<ColumnDef>,
}

impl ListingSchema {
    /// The fixed schema of the real-estate listing pipeline.
    pub fn listing() -> Self {
        use ColumnOrigin::{Buildings, Flats};
        use ColumnRole::{Categorical, Flag, Float, Identity, Integer};

        let def = |name, role, origin, select_expr, persisted| ColumnDef {
            name,
            role,
            origin,
            select_expr,
            persisted,
        };

        Self {
            columns: vec![
                def("building_id", Identity, Flats, "f.building_id", true),
                def("flat_id", Identity, Flats, "f.id AS flat_id", true),
                def("build_year", Integer, Buildings, "b.build_year", true),
                def(
                    "building_type_int",
                    Categorical,
                    Buildings,
                    "b.building_type_int",
                    true,
                ),
                def("latitude", Float, Buildings, "b.latitude", true),
                def("longitude", Float, Buildings, "b.longitude", true),
                def("ceiling_height", Float, Buildings, "b.ceiling_height", true),
                def("flats_count", Integer, Buildings, "b.flats_count", true),
                def("floors_total", Integer, Buildings, "b.floors_total", true),
                def("has_elevator", Flag, Buildings, "b.has_elevator", true),
                def("floor", Integer, Flats, "f.floor", true),
                def("kitchen_area", Float, Flats, "f.kitchen_area", true),
                def("living_area", Float, Flats, "f.living_area", true),
                def("rooms", Integer, Flats, "f.rooms", true),
                def("is_apartment", Flag, Flats, "f.is_apartment", true),
                def("studio", Flag, Flats, "f.studio", false),
                def("total_area", Float, Flats, "f.total_area", true),
                def(PRICE, Float, Flats, "f.price", true),
            ],
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Columns serving row identification only.
    pub fn identity_columns(&self) -> Vec<&'static str> {
        self.names_where(|c| c.role == ColumnRole::Identity)
    }

    /// Boolean-like columns coerced to integers by the transformer.
    pub fn flag_columns(&self) -> Vec<&'static str> {
        self.names_where(|c| c.role == ColumnRole::Flag)
    }

    /// Columns compared when detecting duplicate rows: everything except
    /// the identity columns.
    pub fn dedup_columns(&self) -> Vec<&'static str> {
        self.names_where(|c| c.role != ColumnRole::Identity)
    }

    /// Columns eligible for anomaly detection: everything except identity
    /// and categorical columns.
    pub fn anomaly_columns(&self) -> Vec<&'static str> {
        self.names_where(|c| {
            c.role != ColumnRole::Identity && c.role != ColumnRole::Categorical
        })
    }

    /// Columns written to the destination table, in record-set order.
    pub fn load_columns(&self) -> Vec<&'static str> {
        self.names_where(|c| c.persisted)
    }

    /// Column definitions written to the destination table.
    pub fn load_column_defs(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.persisted)
    }

    /// Names of columns dropped before load.
    pub fn transient_columns(&self) -> Vec<&'static str> {
        self.names_where(|c| !c.persisted)
    }

    /// The extraction query: a left outer join of buildings against flats,
    /// keeping buildings without any matching flat (their flat-side columns
    /// come back null).
    pub fn select_sql(&self, buildings_table: &str, flats_table: &str) -> String {
        let projection: Vec<&str> = self.columns.iter().map(|c| c.select_expr).collect();
        format!(
            "SELECT {} FROM {} AS b LEFT OUTER JOIN {} AS f ON b.id = f.building_id",
            projection.join(", "),
            buildings_table,
            flats_table,
        )
    }

    /// The per-row insert statement. The destination's synthetic `id` key is
    /// never supplied, so the conflict clause only matters when a concurrent
    /// run races the count guard; it makes the insert idempotent on the
    /// declared unique key.
    pub fn insert_sql(&self, destination_table: &str) -> String {
        let fields = self.load_columns();
        let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("${i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (id) DO NOTHING",
            destination_table,
            fields.join(", "),
            placeholders.join(", "),
        )
    }

    fn names_where(&self, predicate: impl Fn(&ColumnDef) -> bool) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| predicate(c))
            .map(|c| c.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identity_columns() {
        let schema = ListingSchema::listing();
        assert_eq!(schema.identity_columns(), vec!["building_id", "flat_id"]);
    }

    #[test]
    fn test_anomaly_columns_exclude_identity_and_categorical() {
        let schema = ListingSchema::listing();
        let eligible = schema.anomaly_columns();
        assert!(!eligible.contains(&"building_id"));
        assert!(!eligible.contains(&"flat_id"));
        assert!(!eligible.contains(&"building_type_int"));
        assert!(eligible.contains(&"ceiling_height"));
        assert!(eligible.contains(&"price"));
        assert!(eligible.contains(&"studio"));
    }

    #[test]
    fn test_dedup_columns_exclude_identity_only() {
        let schema = ListingSchema::listing();
        let subset = schema.dedup_columns();
        assert!(!subset.contains(&"building_id"));
        assert!(!subset.contains(&"flat_id"));
        assert!(subset.contains(&"building_type_int"));
        assert_eq!(subset.len(), schema.columns().len() - 2);
    }

    #[test]
    fn test_load_columns_drop_studio() {
        let schema = ListingSchema::listing();
        let fields = schema.load_columns();
        assert!(!fields.contains(&"studio"));
        assert_eq!(fields.len(), 17);
        assert_eq!(fields[0], "building_id");
        assert_eq!(*fields.last().unwrap(), "price");
    }

    #[test]
    fn test_select_sql_is_left_outer_join() {
        let schema = ListingSchema::listing();
        let sql = schema.select_sql("buildings", "flats");
        assert!(sql.contains("LEFT OUTER JOIN flats AS f ON b.id = f.building_id"));
        assert!(sql.contains("f.id AS flat_id"));
        assert!(sql.contains("f.studio"));
    }

    #[test]
    fn test_insert_sql_shape() {
        let schema = ListingSchema::listing();
        let sql = schema.insert_sql("real_estate_listings");
        assert!(sql.starts_with("INSERT INTO real_estate_listings (building_id, flat_id,"));
        assert!(sql.contains("$17"));
        assert!(!sql.contains("$18"));
        assert!(!sql.contains("studio"));
        assert!(sql.ends_with("ON CONFLICT (id) DO NOTHING"));
    }
}
