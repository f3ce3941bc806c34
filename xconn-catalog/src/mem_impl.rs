use crate::error::{Error, Result};
use crate::{Catalog, Column, ColumnID, IndexDef, OptionBag, Schema, SchemaID, Table, TableID};
use crate::TableSpec;
use indexmap::IndexMap;
use parking_lot::RwLock;
use semistr::SemiStr;
use std::collections::HashMap;

/// In-memory catalog. Names of tables and columns are matched
/// case-insensitively.
#[derive(Debug, Default)]
pub struct MemCatalog {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    schemas: IndexMap<SemiStr, Schema>,
    tables: IndexMap<SchemaID, Vec<Table>>,
    table_columns: HashMap<TableID, TableWithColumns>,
    schema_id_gen: u32,
    table_id_gen: u32,
    column_id_gen: u32,
    version_gen: u64,
}

#[derive(Debug)]
pub struct TableWithColumns {
    table: Table,
    columns: Vec<Column>,
    indexes: Vec<IndexDef>,
}

impl Catalog for MemCatalog {
    #[inline]
    fn all_schemas(&self) -> Vec<Schema> {
        let inner = self.inner.read();
        inner.schemas.values().cloned().collect()
    }

    #[inline]
    fn exists_schema(&self, schema_name: &str) -> bool {
        let inner = self.inner.read();
        inner.schemas.contains_key(schema_name)
    }

    #[inline]
    fn find_schema_by_name(&self, schema_name: &str) -> Option<Schema> {
        let inner = self.inner.read();
        inner.schemas.get(schema_name).cloned()
    }

    #[inline]
    fn all_tables_in_schema(&self, schema_id: &SchemaID) -> Vec<Table> {
        let inner = self.inner.read();
        inner.tables.get(schema_id).cloned().unwrap_or_default()
    }

    #[inline]
    fn exists_table(&self, schema_id: &SchemaID, table_name: &str) -> bool {
        self.find_table_by_name(schema_id, table_name).is_some()
    }

    #[inline]
    fn find_table_by_name(&self, schema_id: &SchemaID, table_name: &str) -> Option<Table> {
        let inner = self.inner.read();
        inner.tables.get(schema_id).and_then(|ts| {
            ts.iter()
                .find(|t| t.name.as_str().eq_ignore_ascii_case(table_name))
                .cloned()
        })
    }

    #[inline]
    fn find_table(&self, table_id: &TableID) -> Option<Table> {
        let inner = self.inner.read();
        inner
            .table_columns
            .get(table_id)
            .map(|twc| twc.table.clone())
    }

    #[inline]
    fn all_columns_in_table(&self, table_id: &TableID) -> Vec<Column> {
        let inner = self.inner.read();
        inner
            .table_columns
            .get(table_id)
            .map(|twc| twc.columns.clone())
            .unwrap_or_default()
    }

    #[inline]
    fn find_column_by_name(&self, table_id: &TableID, column_name: &str) -> Option<Column> {
        let inner = self.inner.read();
        inner.table_columns.get(table_id).and_then(|twc| {
            twc.columns
                .iter()
                .find(|c| c.name.as_str().eq_ignore_ascii_case(column_name))
                .cloned()
        })
    }

    #[inline]
    fn find_indexes(&self, table_id: &TableID) -> Vec<IndexDef> {
        let inner = self.inner.read();
        inner
            .table_columns
            .get(table_id)
            .map(|twc| twc.indexes.clone())
            .unwrap_or_default()
    }

    #[inline]
    fn create_schema(&self, schema_name: &str) -> Result<SchemaID> {
        let mut inner = self.inner.write();
        if inner.schemas.contains_key(schema_name) {
            return Err(Error::SchemaAlreadyExists(SemiStr::new(schema_name)));
        }
        inner.schema_id_gen += 1;
        let id = SchemaID::new(inner.schema_id_gen);
        let name = SemiStr::new(schema_name);
        let schema = Schema {
            id,
            name: name.clone(),
        };
        inner.schemas.insert(name, schema);
        inner.tables.insert(id, vec![]);
        Ok(id)
    }

    #[inline]
    fn drop_schema(&self, schema_name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.schemas.shift_remove(schema_name) {
            None => Err(Error::SchemaNotExists(SemiStr::new(schema_name))),
            Some(schema) => {
                if let Some(tables) = inner.tables.shift_remove(&schema.id) {
                    for table in tables {
                        inner.table_columns.remove(&table.id);
                    }
                }
                Ok(())
            }
        }
    }

    #[inline]
    fn create_table(&self, table_spec: TableSpec) -> Result<TableID> {
        let mut inner = self.inner.write();
        let Inner {
            schemas,
            tables,
            table_columns,
            table_id_gen,
            column_id_gen,
            version_gen,
            ..
        } = &mut *inner;
        let schema = match schemas.get(table_spec.schema_name.as_str()) {
            None => return Err(Error::SchemaNotExists(table_spec.schema_name)),
            Some(schema) => schema,
        };
        let tables_in_schema = tables.entry(schema.id).or_default();
        if tables_in_schema
            .iter()
            .any(|t| t.name.as_str().eq_ignore_ascii_case(table_spec.table_name.as_str()))
        {
            return Err(Error::TableAlreadyExists(table_spec.table_name));
        }
        for (i, c) in table_spec.columns.iter().enumerate() {
            if table_spec.columns[..i]
                .iter()
                .any(|p| p.name.as_str().eq_ignore_ascii_case(c.name.as_str()))
            {
                return Err(Error::ColumnNameNotUnique(c.name.clone()));
            }
        }
        for index in &table_spec.indexes {
            for part in &index.parts {
                if !table_spec
                    .columns
                    .iter()
                    .any(|c| c.name.as_str().eq_ignore_ascii_case(part.as_str()))
                {
                    return Err(Error::IndexColumnNotExists(index.name.clone(), part.clone()));
                }
            }
        }
        *table_id_gen += 1;
        *version_gen += 1;
        let table_id = TableID::new(*table_id_gen);
        let table = Table {
            id: table_id,
            schema_id: schema.id,
            name: table_spec.table_name.clone(),
            options: table_spec.options,
            version: *version_gen,
        };
        tables_in_schema.push(table.clone());
        let mut columns = Vec::with_capacity(table_spec.columns.len());
        for (i, c) in table_spec.columns.into_iter().enumerate() {
            *column_id_gen += 1;
            let id = ColumnID::new(*column_id_gen);
            let column = Column {
                id,
                table_id,
                name: c.name,
                pty: c.pty,
                attr: c.attr,
                idx: i as u32,
                options: c.options,
            };
            columns.push(column);
        }
        table_columns.insert(
            table_id,
            TableWithColumns {
                table,
                columns,
                indexes: table_spec.indexes,
            },
        );
        Ok(table_id)
    }

    #[inline]
    fn drop_table(&self, schema_name: &str, table_name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let Inner {
            schemas,
            tables,
            table_columns,
            ..
        } = &mut *inner;
        match schemas.get(schema_name) {
            None => Err(Error::SchemaNotExists(SemiStr::new(schema_name))),
            Some(schema) => {
                let tables_in_schema = tables.entry(schema.id).or_default();
                match tables_in_schema
                    .iter()
                    .position(|t| t.name.as_str().eq_ignore_ascii_case(table_name))
                {
                    None => Err(Error::TableNotExists(SemiStr::new(table_name))),
                    Some(idx) => {
                        let table = tables_in_schema.swap_remove(idx);
                        table_columns.remove(&table.id);
                        Ok(())
                    }
                }
            }
        }
    }

    #[inline]
    fn alter_table_options(
        &self,
        schema_name: &str,
        table_name: &str,
        options: OptionBag,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let Inner {
            schemas,
            tables,
            table_columns,
            version_gen,
            ..
        } = &mut *inner;
        let schema = schemas
            .get(schema_name)
            .ok_or_else(|| Error::SchemaNotExists(SemiStr::new(schema_name)))?;
        let table = tables
            .entry(schema.id)
            .or_default()
            .iter_mut()
            .find(|t| t.name.as_str().eq_ignore_ascii_case(table_name))
            .ok_or_else(|| Error::TableNotExists(SemiStr::new(table_name)))?;
        *version_gen += 1;
        table.options = options;
        table.version = *version_gen;
        if let Some(twc) = table_columns.get_mut(&table.id) {
            twc.table = table.clone();
        }
        Ok(())
    }
}
