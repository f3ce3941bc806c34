pub mod backend;
pub mod def;
pub mod error;
pub mod mem_impl;
pub mod option;

pub use backend::{BackendType, PseudoColumn, RecordFormat};
pub use def::{ColumnDef, ColumnOptions, IndexDef};
pub use option::OptionBag;

use crate::error::Result;
use bitflags::bitflags;
use semistr::SemiStr;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use xconn_datatype::PreciseType;

/// Catalog is the host-side store of table metadata.
///
/// Table access layer only reads from it. Every change of a table
/// assigns a new schema version, so cached definitions built from an
/// older version can be detected and rebuilt.
/// It could be shared between threads.
pub trait Catalog: Send + Sync {
    fn create_schema(&self, schema_name: &str) -> Result<SchemaID>;

    fn drop_schema(&self, schema_name: &str) -> Result<()>;

    fn all_schemas(&self) -> Vec<Schema>;

    fn exists_schema(&self, schema_name: &str) -> bool;

    fn find_schema_by_name(&self, schema_name: &str) -> Option<Schema>;

    fn create_table(&self, table_spec: TableSpec) -> Result<TableID>;

    fn drop_table(&self, schema_name: &str, table_name: &str) -> Result<()>;

    /// Replaces options of the table and bumps its version.
    fn alter_table_options(
        &self,
        schema_name: &str,
        table_name: &str,
        options: OptionBag,
    ) -> Result<()>;

    fn all_tables_in_schema(&self, schema_id: &SchemaID) -> Vec<Table>;

    fn exists_table(&self, schema_id: &SchemaID, table_name: &str) -> bool;

    fn find_table_by_name(&self, schema_id: &SchemaID, table_name: &str) -> Option<Table>;

    fn find_table(&self, table_id: &TableID) -> Option<Table>;

    fn all_columns_in_table(&self, table_id: &TableID) -> Vec<Column>;

    fn find_column_by_name(&self, table_id: &TableID, column_name: &str) -> Option<Column>;

    fn find_indexes(&self, table_id: &TableID) -> Vec<IndexDef>;
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectID<T> {
    id: u32,
    _marker: PhantomData<T>,
}

impl<T> fmt::Debug for ObjectID<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectID").field("id", &self.id).finish()
    }
}

impl<T> ObjectID<T> {
    /// Required to create object only within the catalog module.
    pub(crate) fn new(id: u32) -> Self {
        ObjectID {
            id,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct S;
pub type SchemaID = ObjectID<S>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct T;
pub type TableID = ObjectID<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct C;
pub type ColumnID = ObjectID<C>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub id: SchemaID,
    pub name: SemiStr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub id: TableID,
    pub schema_id: SchemaID,
    pub name: SemiStr,
    pub options: OptionBag,
    /// Schema version, changed on every alteration.
    pub version: u64,
}

/// Table spec used in creating table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub schema_name: SemiStr,
    pub table_name: SemiStr,
    pub options: OptionBag,
    pub columns: Vec<ColumnSpec>,
    pub indexes: Vec<IndexDef>,
}

impl TableSpec {
    #[inline]
    pub fn new(schema_name: &str, table_name: &str, columns: Vec<ColumnSpec>) -> Self {
        TableSpec {
            schema_name: SemiStr::new(schema_name),
            table_name: SemiStr::new(table_name),
            options: OptionBag::new(),
            columns,
            indexes: vec![],
        }
    }

    #[inline]
    pub fn with_options(mut self, options: OptionBag) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub id: ColumnID,
    pub table_id: TableID,
    pub name: SemiStr,
    pub pty: PreciseType,
    pub idx: u32,
    pub attr: ColumnAttr,
    pub options: OptionBag,
}

/// Column spec used in creating table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: SemiStr,
    pub pty: PreciseType,
    pub attr: ColumnAttr,
    pub options: OptionBag,
}

impl ColumnSpec {
    #[inline]
    pub fn new(name: &str, pty: PreciseType, attr: ColumnAttr) -> Self {
        ColumnSpec {
            name: SemiStr::new(name),
            pty,
            attr,
            options: OptionBag::new(),
        }
    }
}

bitflags! {
    pub struct ColumnAttr: u8 {
        const PK = 0x01; // primary key
        const UK = 0x02; // unique key
        const NOT_NULL = 0x04;
    }
}
