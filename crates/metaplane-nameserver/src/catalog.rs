//! Table catalog.
//!
//! Canonical table/database/procedure metadata plus partition placement.
//! The catalog is pure in-memory state guarded by the main mutex; the
//! nameserver persists each record to the metastore before committing a
//! mutation here.

use crate::error::NsError;
use metaplane::PartitionMeta;
use metaplane::table::{ColumnKey, ProcedureInfo, TableInfo, TablePartition, TtlDesc};
use metaplane::types::{Pid, Tid, TtlType};
use std::collections::{BTreeMap, HashMap};

/// Upper bound on the absolute TTL, in minutes (30 years).
pub const MAX_ABS_TTL_MIN: u64 = 60 * 24 * 365 * 30;
/// Upper bound on the latest-N TTL.
pub const MAX_LAT_TTL: u64 = 1000;
/// Upper bound on columns added after table creation.
pub const MAX_ADDED_COLUMNS: usize = 63;
/// Schema version ids are a single byte on the wire.
pub const MAX_SCHEMA_VERSION: u32 = 255;

/// Canonical catalog state. Default-database tables are keyed by name,
/// named-database tables by (db, name).
#[derive(Default)]
pub struct TableCatalog {
    default_tables: BTreeMap<String, TableInfo>,
    db_tables: BTreeMap<String, BTreeMap<String, TableInfo>>,
    procedures: BTreeMap<String, BTreeMap<String, ProcedureInfo>>,
    sdk_endpoints: BTreeMap<String, String>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ===========================
    // Databases
    // ===========================

    pub fn has_db(&self, db: &str) -> bool {
        db.is_empty() || self.db_tables.contains_key(db)
    }

    pub fn create_db(&mut self, db: &str) -> Result<(), NsError> {
        if db.is_empty() {
            return Err(NsError::InvalidParameter {
                reason: "database name is empty".to_string(),
            });
        }
        if self.db_tables.contains_key(db) {
            return Err(NsError::DatabaseExists { db: db.to_string() });
        }
        self.db_tables.insert(db.to_string(), BTreeMap::new());
        Ok(())
    }

    /// Drop only when no tables and no procedures remain.
    pub fn drop_db(&mut self, db: &str) -> Result<(), NsError> {
        let tables = self
            .db_tables
            .get(db)
            .ok_or(NsError::DatabaseNotFound { db: db.to_string() })?;
        let has_procedures = self
            .procedures
            .get(db)
            .is_some_and(|sps| !sps.is_empty());
        if !tables.is_empty() || has_procedures {
            return Err(NsError::DatabaseNotEmpty { db: db.to_string() });
        }
        self.db_tables.remove(db);
        Ok(())
    }

    pub fn databases(&self) -> Vec<String> {
        self.db_tables.keys().cloned().collect()
    }

    // ===========================
    // Tables
    // ===========================

    pub fn get(&self, db: &str, name: &str) -> Option<&TableInfo> {
        if db.is_empty() {
            self.default_tables.get(name)
        } else {
            self.db_tables.get(db)?.get(name)
        }
    }

    pub fn get_mut(&mut self, db: &str, name: &str) -> Option<&mut TableInfo> {
        if db.is_empty() {
            self.default_tables.get_mut(name)
        } else {
            self.db_tables.get_mut(db)?.get_mut(name)
        }
    }

    pub fn expect(&self, db: &str, name: &str) -> Result<&TableInfo, NsError> {
        self.get(db, name).ok_or(NsError::TableNotFound {
            db: db.to_string(),
            name: name.to_string(),
        })
    }

    pub fn expect_mut(&mut self, db: &str, name: &str) -> Result<&mut TableInfo, NsError> {
        let table = if db.is_empty() {
            self.default_tables.get_mut(name)
        } else {
            self.db_tables.get_mut(db).and_then(|m| m.get_mut(name))
        };
        table.ok_or(NsError::TableNotFound {
            db: db.to_string(),
            name: name.to_string(),
        })
    }

    pub fn insert(&mut self, table: TableInfo) {
        if table.db.is_empty() {
            self.default_tables.insert(table.name.clone(), table);
        } else {
            self.db_tables
                .entry(table.db.clone())
                .or_default()
                .insert(table.name.clone(), table);
        }
    }

    pub fn remove(&mut self, db: &str, name: &str) -> Option<TableInfo> {
        if db.is_empty() {
            self.default_tables.remove(name)
        } else {
            self.db_tables.get_mut(db)?.remove(name)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableInfo> {
        self.default_tables
            .values()
            .chain(self.db_tables.values().flat_map(|m| m.values()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TableInfo> {
        self.default_tables
            .values_mut()
            .chain(self.db_tables.values_mut().flat_map(|m| m.values_mut()))
    }

    pub fn by_tid(&self, tid: Tid) -> Option<&TableInfo> {
        self.iter().find(|t| t.tid == tid)
    }

    pub fn by_tid_mut(&mut self, tid: Tid) -> Option<&mut TableInfo> {
        self.iter_mut().find(|t| t.tid == tid)
    }

    // ===========================
    // Validation
    // ===========================

    /// Validate a table spec before creation. The column keys used for the
    /// table are returned (synthesized from index-flagged columns when the
    /// spec carries none).
    pub fn validate_create(
        &self,
        table: &TableInfo,
        healthy_tablets: usize,
    ) -> Result<Vec<ColumnKey>, NsError> {
        if table.name.is_empty() {
            return Err(NsError::InvalidParameter {
                reason: "table name is empty".to_string(),
            });
        }
        if !self.has_db(&table.db) {
            return Err(NsError::DatabaseNotFound {
                db: table.db.clone(),
            });
        }
        if self.get(&table.db, &table.name).is_some() {
            return Err(NsError::TableExists {
                db: table.db.clone(),
                name: table.name.clone(),
            });
        }
        if table.column_desc.is_empty() {
            return Err(NsError::InvalidParameter {
                reason: "no columns".to_string(),
            });
        }
        if table.partition_num == 0 {
            return Err(NsError::InvalidParameter {
                reason: "partition_num must be positive".to_string(),
            });
        }
        if table.replica_num == 0 {
            return Err(NsError::InvalidParameter {
                reason: "replica_num must be positive".to_string(),
            });
        }
        if table.replica_num as usize > healthy_tablets {
            return Err(NsError::InvalidParameter {
                reason: format!(
                    "replica_num {} exceeds healthy tablet count {healthy_tablets}",
                    table.replica_num
                ),
            });
        }
        validate_ttl(&table.ttl)?;

        // Partition-key columns must exist and be unique.
        for (i, key) in table.partition_key.iter().enumerate() {
            if table.column(key).is_none() {
                return Err(NsError::InvalidParameter {
                    reason: format!("partition key column '{key}' does not exist"),
                });
            }
            if table.partition_key[..i].contains(key) {
                return Err(NsError::InvalidParameter {
                    reason: format!("duplicate partition key column '{key}'"),
                });
            }
        }

        let column_keys = if table.column_keys.is_empty() {
            synthesize_column_keys(table)
        } else {
            table.column_keys.clone()
        };
        if column_keys.is_empty() {
            return Err(NsError::WrongColumnKey {
                reason: "table has no index".to_string(),
            });
        }
        for ck in &column_keys {
            self.validate_column_key(table, ck)?;
        }
        Ok(column_keys)
    }

    /// Shared column-key checks for CreateTable and AddIndex.
    pub fn validate_column_key(&self, table: &TableInfo, ck: &ColumnKey) -> Result<(), NsError> {
        if ck.index_name.is_empty() || ck.col_names.is_empty() {
            return Err(NsError::WrongColumnKey {
                reason: "index name and columns are required".to_string(),
            });
        }
        for col_name in &ck.col_names {
            let col = table
                .column(col_name)
                .ok_or_else(|| NsError::WrongColumnKey {
                    reason: format!("index column '{col_name}' does not exist"),
                })?;
            if col.col_type.is_float() {
                return Err(NsError::WrongColumnKey {
                    reason: format!("index column '{col_name}' is float or double"),
                });
            }
        }
        if let Some(ts_name) = &ck.ts_name {
            let ts_col = table
                .column(ts_name)
                .ok_or_else(|| NsError::WrongColumnKey {
                    reason: format!("ts column '{ts_name}' does not exist"),
                })?;
            if ts_col.col_type.is_float() {
                return Err(NsError::WrongColumnKey {
                    reason: format!("ts column '{ts_name}' has wrong type"),
                });
            }
        }
        Ok(())
    }

    // ===========================
    // Placement
    // ===========================

    /// Current (partition, leadership) load per endpoint across the catalog.
    fn endpoint_load(&self) -> HashMap<String, (usize, usize)> {
        let mut load: HashMap<String, (usize, usize)> = HashMap::new();
        for table in self.iter() {
            for part in &table.table_partition {
                for meta in &part.partition_meta {
                    let entry = load.entry(meta.endpoint.clone()).or_default();
                    entry.0 += 1;
                    if meta.is_leader {
                        entry.1 += 1;
                    }
                }
            }
        }
        load
    }

    /// Pick replica placements for a new table: round-robin over the sorted
    /// healthy endpoints starting from the least-loaded one, then give each
    /// partition's leadership to the assigned replica with the fewest
    /// current leaderships.
    pub fn build_partitions(
        &self,
        partition_num: u32,
        replica_num: u32,
        endpoints: &[String],
    ) -> Result<Vec<TablePartition>, NsError> {
        if replica_num == 0 {
            return Err(NsError::InvalidParameter {
                reason: "replica_num must be positive".to_string(),
            });
        }
        if endpoints.is_empty() || (replica_num as usize) > endpoints.len() {
            return Err(NsError::InvalidParameter {
                reason: "not enough healthy tablets".to_string(),
            });
        }
        let load = self.endpoint_load();
        let part_count = |ep: &str| load.get(ep).map(|l| l.0).unwrap_or(0);
        let mut leader_count: HashMap<&str, usize> = endpoints
            .iter()
            .map(|ep| (ep.as_str(), load.get(ep).map(|l| l.1).unwrap_or(0)))
            .collect();

        let start = endpoints
            .iter()
            .enumerate()
            .min_by_key(|(i, ep)| (part_count(ep), *i))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mut cursor = start;
        let mut partitions = Vec::with_capacity(partition_num as usize);
        for pid in 0..partition_num {
            let mut part = TablePartition::new(Pid(pid));
            let mut replicas: Vec<&str> = Vec::with_capacity(replica_num as usize);
            for _ in 0..replica_num {
                replicas.push(endpoints[cursor % endpoints.len()].as_str());
                cursor += 1;
            }
            let leader = *replicas
                .iter()
                .min_by_key(|ep| leader_count.get(**ep).copied().unwrap_or(0))
                .unwrap();
            *leader_count.entry(leader).or_default() += 1;
            for ep in replicas {
                part.partition_meta.push(PartitionMeta::new(ep, ep == leader));
            }
            partitions.push(part);
        }
        Ok(partitions)
    }

    // ===========================
    // Procedures
    // ===========================

    pub fn get_procedure(&self, db: &str, name: &str) -> Option<&ProcedureInfo> {
        self.procedures.get(db)?.get(name)
    }

    pub fn insert_procedure(&mut self, procedure: ProcedureInfo) {
        self.procedures
            .entry(procedure.db.clone())
            .or_default()
            .insert(procedure.name.clone(), procedure);
    }

    pub fn remove_procedure(&mut self, db: &str, name: &str) -> Option<ProcedureInfo> {
        self.procedures.get_mut(db)?.remove(name)
    }

    pub fn procedures(&self) -> impl Iterator<Item = &ProcedureInfo> {
        self.procedures.values().flat_map(|m| m.values())
    }

    /// Names of procedures referencing (db, table); DropTable refuses while
    /// any exist.
    pub fn procedures_referencing(&self, db: &str, table: &str) -> Vec<String> {
        self.procedures()
            .filter(|sp| {
                sp.tables
                    .iter()
                    .any(|(t_db, t_name)| t_db == db && t_name == table)
            })
            .map(|sp| sp.name.clone())
            .collect()
    }

    // ===========================
    // SDK endpoints
    // ===========================

    pub fn sdk_endpoints(&self) -> &BTreeMap<String, String> {
        &self.sdk_endpoints
    }

    pub fn set_sdk_endpoint(&mut self, endpoint: &str, real: &str) -> Result<(), NsError> {
        if self
            .sdk_endpoints
            .get(endpoint)
            .is_some_and(|existing| existing == real)
        {
            return Err(NsError::SdkEndpointDuplicate {
                endpoint: endpoint.to_string(),
            });
        }
        self.sdk_endpoints
            .insert(endpoint.to_string(), real.to_string());
        Ok(())
    }

    pub fn remove_sdk_endpoint(&mut self, endpoint: &str) -> Option<String> {
        self.sdk_endpoints.remove(endpoint)
    }

    pub fn load_sdk_endpoint(&mut self, endpoint: &str, real: &str) {
        self.sdk_endpoints
            .insert(endpoint.to_string(), real.to_string());
    }
}

fn validate_ttl(ttl: &TtlDesc) -> Result<(), NsError> {
    let abs_ok = ttl.abs_ttl_min <= MAX_ABS_TTL_MIN;
    let lat_ok = ttl.lat_ttl <= MAX_LAT_TTL;
    let ok = match ttl.ttl_type {
        TtlType::Absolute => abs_ok,
        TtlType::Latest => lat_ok,
        TtlType::AbsAndLat | TtlType::AbsOrLat => abs_ok && lat_ok,
    };
    if !ok {
        return Err(NsError::InvalidTtl {
            reason: format!(
                "ttl {}min/{} exceeds limits {MAX_ABS_TTL_MIN}min/{MAX_LAT_TTL}",
                ttl.abs_ttl_min, ttl.lat_ttl
            ),
        });
    }
    Ok(())
}

/// Build one column key per index-flagged column when the spec carries none.
fn synthesize_column_keys(table: &TableInfo) -> Vec<ColumnKey> {
    let ts_name = table
        .column_desc
        .iter()
        .find(|c| c.is_ts_col)
        .map(|c| c.name.clone());
    table
        .column_desc
        .iter()
        .filter(|c| c.is_index)
        .map(|c| {
            if c.col_type.is_float() {
                tracing::warn!(column = %c.name, "index requested on float column");
            }
            ColumnKey {
                index_name: c.name.clone(),
                col_names: vec![c.name.clone()],
                ts_name: ts_name.clone(),
                flag: 0,
            }
        })
        .collect()
}
