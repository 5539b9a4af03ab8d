//! Process-wide runtime.
//!
//! Owns `Catalog`, `Network`, `StatisticsManager`, and `Scheduler` as
//! `Arc`s and is the only thing any of them hold a back-reference to —
//! breaking the cyclic-singleton pattern the original design flagged.
//! `Runtime::execute` is the single entry point a connection dispatches a
//! parsed `Command` through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::network::Network;
use crate::protocol::{Command, Response};
use crate::query::planner::{
    AggregateFunction, CompareOp, IndexCatalog, JoinSpec, OptimizationLevel, Predicate,
    SelectRequest,
};
use crate::query::{self, QueryCache};
use crate::replication::{ReplicationMessage, ReplicationSink};
use crate::reshuffle::{self, PlacementTransport};
use crate::scheduler::Scheduler;
use crate::statistics::StatisticsManager;
use crate::storage::catalog::{Catalog, Table};

/// Adapts `Catalog` to the planner's and executor's view of a query: every
/// leaf scan names its own table (the `FROM` table or a join's right-hand
/// side), so this resolves each by name against `db` rather than pinning a
/// single pre-resolved `Table`.
struct TableView<'a> {
    catalog: &'a Catalog,
    db: &'a str,
}

impl TableView<'_> {
    fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.catalog.table(self.db, name).ok()
    }
}

impl IndexCatalog for TableView<'_> {
    fn index_for(&self, table: &str, column: &str) -> Option<Arc<crate::index::BTreeIndex>> {
        self.table(table)?.index(column)
    }
}

impl query::RowSource for TableView<'_> {
    fn scan_table(&self, table: &str) -> Vec<query::Row> {
        self.table(table).map(|t| t.scan()).unwrap_or_default()
    }

    fn index_lookup(&self, table: &str, column: &str, value: &Value) -> Vec<query::Row> {
        let Some(table) = self.table(table) else {
            return Vec::new();
        };
        let Some(index) = table.index(column) else {
            return Vec::new();
        };
        index
            .lookup(value)
            .into_iter()
            .filter_map(|id| table.get(id).map(|doc| (id, doc)))
            .collect()
    }

    fn range_lookup(
        &self,
        table: &str,
        column: &str,
        low: Option<&Value>,
        high: Option<&Value>,
    ) -> Vec<query::Row> {
        let Some(table) = self.table(table) else {
            return Vec::new();
        };
        let Some(index) = table.index(column) else {
            return Vec::new();
        };
        index
            .range(low, high)
            .into_iter()
            .filter_map(|id| table.get(id).map(|doc| (id, doc)))
            .collect()
    }
}

pub struct Runtime {
    node_id: Uuid,
    config: Config,
    catalog: Arc<Catalog>,
    network: Arc<Network>,
    stats: Arc<StatisticsManager>,
    scheduler: Arc<Scheduler>,
    cache: QueryCache,
    network_online: Arc<AtomicBool>,
    optimization_enabled: AtomicBool,
    optimization_level: RwLock<OptimizationLevel>,
    cancel: Arc<AtomicBool>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    pub fn open(config: Config) -> Result<Arc<Self>> {
        let node_id = Uuid::new_v4();
        let catalog = Arc::new(Catalog::open(config.clone())?);
        let network = Arc::new(Network::new(node_id, &config));
        let stats = Arc::new(StatisticsManager::new());
        let scheduler = Arc::new(Scheduler::new(config.scheduler_tick));

        Ok(Arc::new(Self {
            node_id,
            config,
            catalog,
            network,
            stats,
            scheduler,
            cache: QueryCache::new(),
            network_online: Arc::new(AtomicBool::new(true)),
            optimization_enabled: AtomicBool::new(true),
            optimization_level: RwLock::new(OptimizationLevel::default()),
            cancel: Arc::new(AtomicBool::new(false)),
            background: Mutex::new(Vec::new()),
        }))
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Start every background task: discovery beacons, the scheduler tick,
    /// and the reshuffle watcher that reacts to peers going `lost`.
    pub fn start(self: &Arc<Self>) {
        self.network.start_discovery(&self.config);

        let sink: Arc<dyn ReplicationSink> = Arc::clone(self);
        let replication_handle = crate::network::rpc::spawn_receiver(
            self.network.replication_addr().to_string(),
            sink,
            Arc::clone(&self.cancel),
        );

        let scheduler_handle = Arc::clone(&self.scheduler).spawn_periodic(
            Arc::clone(&self.catalog),
            Arc::clone(&self.network_online),
            Arc::clone(&self.cancel),
        );

        let this = Arc::clone(self);
        let reshuffle_handle = thread::Builder::new()
            .name("serengeti-reshuffle-watch".to_string())
            .spawn(move || {
                while !this.cancel.load(Ordering::Relaxed) {
                    thread::sleep(this.config.beacon_interval);
                    for lost in this.network.evaluate_peers() {
                        tracing::warn!(node = %lost, "peer declared lost, reshuffling");
                        let report = reshuffle::reshuffle_node(
                            &this.catalog,
                            lost,
                            this.network.as_ref(),
                            this.config.reshuffle_max_retries,
                        );
                        tracing::info!(
                            repaired = report.repaired,
                            under_repaired = report.under_repaired,
                            aborted = report.aborted,
                            "reshuffle complete"
                        );
                    }
                }
            })
            .expect("failed to spawn reshuffle watcher thread");

        let mut background = self.background.lock();
        background.push(replication_handle);
        background.push(scheduler_handle);
        background.push(reshuffle_handle);
    }

    pub fn shutdown(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.network.shutdown();
        for handle in self.background.lock().drain(..) {
            let _ = handle.join();
        }
        let _ = self.scheduler.perform_persist(&self.catalog, true);
    }

    /// Execute one parsed command and produce its response.
    pub fn execute(&self, command: Command) -> Response {
        let start = Instant::now();
        let name = command.name().to_string();
        match self.dispatch(command) {
            Ok(response) => response,
            Err(e) => Response::failed(&name, elapsed_ms(start), e),
        }
    }

    fn dispatch(&self, command: Command) -> Result<Response> {
        let start = Instant::now();
        match command {
            Command::ShowDatabases => {
                let names = self.catalog.database_names();
                Ok(Response::ok("show databases", elapsed_ms(start))
                    .with_list(names.into_iter().map(Value::from).collect()))
            }
            Command::ShowTables { db } => {
                let database = self
                    .catalog
                    .database(&db)
                    .ok_or_else(|| CoreError::DatabaseNotFound(db.clone()))?;
                let names = database.table_names();
                Ok(Response::ok("show tables", elapsed_ms(start))
                    .with_list(names.into_iter().map(Value::from).collect()))
            }
            Command::CreateDatabase { db } => {
                self.catalog.create_database(&db)?;
                Ok(Response::ok("create database", elapsed_ms(start)))
            }
            Command::DropDatabase { db } => {
                self.catalog.drop_database(&db)?;
                Ok(Response::ok("drop database", elapsed_ms(start)))
            }
            Command::CreateTable { db, table } => {
                self.catalog.create_table(&db, &table)?;
                Ok(Response::ok("create table", elapsed_ms(start)))
            }
            Command::DropTable { db, table } => {
                self.catalog.drop_table(&db, &table)?;
                Ok(Response::ok("drop table", elapsed_ms(start)))
            }
            Command::Insert {
                db,
                table,
                columns,
                values,
            } => self.insert(&db, &table, columns, values, start),
            Command::Update {
                db,
                table,
                set,
                where_column,
                where_value,
            } => self.update(&db, &table, set, &where_column, &where_value, start),
            Command::Delete {
                db,
                table,
                where_column,
                where_value,
            } => self.delete(&db, &table, &where_column, &where_value, start),
            Command::Select(request) => self.select(request, start),
            Command::CreateIndex { db, table, column } => {
                let handle = self.catalog.table(&db, &table)?;
                let index = handle.create_index(&column);
                self.stats.collect_column(&db, &table, &index);
                Ok(Response::ok("create index", elapsed_ms(start)))
            }
            Command::DropIndex { db, table, column } => {
                let handle = self.catalog.table(&db, &table)?;
                handle.drop_index(&column);
                Ok(Response::ok("drop index", elapsed_ms(start)))
            }
            Command::ShowIndexes { on } => {
                let list = match on {
                    Some((db, table)) => {
                        let handle = self.catalog.table(&db, &table)?;
                        handle.index_columns().into_iter().map(Value::from).collect()
                    }
                    None => {
                        let mut all = Vec::new();
                        for database in self.catalog.databases() {
                            for table in database.tables() {
                                for column in table.index_columns() {
                                    all.push(Value::from(format!(
                                        "{}.{}.{}",
                                        database.name(),
                                        table.name(),
                                        column
                                    )));
                                }
                            }
                        }
                        all
                    }
                };
                Ok(Response::ok("show indexes", elapsed_ms(start)).with_list(list))
            }
            Command::DeleteEverything => {
                for database in self.catalog.databases() {
                    self.catalog.drop_database(database.name())?;
                }
                self.cache.clear();
                Ok(Response::ok("delete everything", elapsed_ms(start)))
            }
            Command::OptimizationStatus => {
                let level = *self.optimization_level.read();
                let enabled = self.optimization_enabled.load(Ordering::Relaxed);
                Ok(Response::ok("optimization status", elapsed_ms(start)).with_list(vec![
                    Value::from(format!("enabled={enabled} level={level:?}")),
                ]))
            }
            Command::OptimizationEnable => {
                self.optimization_enabled.store(true, Ordering::Relaxed);
                Ok(Response::ok("optimization enable", elapsed_ms(start)))
            }
            Command::OptimizationDisable => {
                self.optimization_enabled.store(false, Ordering::Relaxed);
                Ok(Response::ok("optimization disable", elapsed_ms(start)))
            }
            Command::OptimizationLevel(level) => {
                *self.optimization_level.write() = level;
                Ok(Response::ok("optimization level", elapsed_ms(start)))
            }
            Command::CacheEnable => {
                self.cache.enable();
                Ok(Response::ok("cache enable", elapsed_ms(start)))
            }
            Command::CacheDisable => {
                self.cache.disable();
                Ok(Response::ok("cache disable", elapsed_ms(start)))
            }
            Command::CacheClear => {
                self.cache.clear();
                Ok(Response::ok("cache clear", elapsed_ms(start)))
            }
            Command::CacheStats => {
                let stats = self.cache.stats();
                Ok(
                    Response::ok("cache stats", elapsed_ms(start)).with_list(vec![Value::from(
                        format!(
                            "hits={} misses={} size={}",
                            stats.hits, stats.misses, stats.size
                        ),
                    )]),
                )
            }
            Command::StatisticsCollect { db, table } => {
                let handle = self.catalog.table(&db, &table)?;
                self.stats.set_row_count(&db, &table, handle.row_count() as u64);
                for column in handle.index_columns() {
                    if let Some(index) = handle.index(&column) {
                        self.stats.collect_column(&db, &table, &index);
                    }
                }
                Ok(Response::ok("statistics collect", elapsed_ms(start)))
            }
        }
    }

    fn insert(
        &self,
        db: &str,
        table: &str,
        columns: Vec<String>,
        values: Vec<String>,
        start: Instant,
    ) -> Result<Response> {
        let handle = self.catalog.table(db, table)?;
        let mut doc = serde_json::Map::new();
        for (column, value) in columns.into_iter().zip(values.into_iter()) {
            doc.insert(column, Value::String(value));
        }
        let row_id = handle.insert(Value::Object(doc))?;
        self.stats.set_row_count(db, table, handle.row_count() as u64);

        let online = self.network.online_nodes();
        let placement = crate::replication::select_primary_secondary(&online)
            .ok_or_else(|| CoreError::PlacementUnavailable(format!("{db}.{table}")))?;
        handle.replica_object().set(row_id, placement);

        if let Some(doc) = handle.get(row_id) {
            let lsn = handle.storage_object().last_lsn(&row_id).unwrap_or(0);
            for target in [placement.primary, placement.secondary] {
                if target != self.node_id {
                    if let Err(e) = self.network.ship_row(target, db, table, row_id, &doc, lsn) {
                        tracing::warn!(error = %e, node = %target, "failed to ship replicated row");
                    }
                }
            }
        }
        let _ = self.network.broadcast_placement(db, table, row_id, placement);

        Ok(Response::ok("insert", elapsed_ms(start)).with_placement(placement.primary, placement.secondary))
    }

    fn update(
        &self,
        db: &str,
        table: &str,
        set: Vec<(String, String)>,
        where_column: &str,
        where_value: &str,
        start: Instant,
    ) -> Result<Response> {
        let handle = self.catalog.table(db, table)?;
        let mut patch = serde_json::Map::new();
        for (column, value) in set {
            patch.insert(column, Value::String(value));
        }

        let mut updated = 0usize;
        for (row_id, doc) in handle.scan() {
            if matches_equality(&doc, where_column, where_value) {
                handle.update(row_id, Value::Object(patch.clone()))?;
                updated += 1;
            }
        }
        Ok(Response::ok("update", elapsed_ms(start))
            .with_list(vec![Value::from(format!("updated {updated} row(s)"))]))
    }

    fn delete(
        &self,
        db: &str,
        table: &str,
        where_column: &str,
        where_value: &str,
        start: Instant,
    ) -> Result<Response> {
        let handle = self.catalog.table(db, table)?;
        let mut deleted = 0usize;
        for (row_id, doc) in handle.scan() {
            if matches_equality(&doc, where_column, where_value) {
                handle.delete(row_id)?;
                deleted += 1;
            }
        }
        self.stats.set_row_count(db, table, handle.row_count() as u64);
        Ok(Response::ok("delete", elapsed_ms(start))
            .with_list(vec![Value::from(format!("deleted {deleted} row(s)"))]))
    }

    fn select(&self, request: SelectRequest, start: Instant) -> Result<Response> {
        let cache_key = select_cache_key(&request);
        if let Some(rows) = self.cache.get(&cache_key) {
            return Ok(Response::ok("select", elapsed_ms(start)).with_list(rows));
        }

        // Confirm the FROM table exists before planning; a join's right-hand
        // side is allowed to resolve lazily per-scan (an absent table just
        // yields no rows from that side).
        self.catalog.table(&request.db, &request.table)?;
        let view = TableView {
            catalog: &self.catalog,
            db: &request.db,
        };

        let level = if self.optimization_enabled.load(Ordering::Relaxed) {
            *self.optimization_level.read()
        } else {
            OptimizationLevel::None
        };

        let plan = query::plan_select(
            &request,
            &self.stats,
            &view,
            level,
            self.config.query_memory_budget,
            self.config.default_selectivity,
        );

        let memory = query::MemoryManager::new(self.config.query_memory_budget);
        let rows = query::execute(&plan.root, &view, &memory)?;
        let docs: Vec<Value> = rows.into_iter().map(|(_, doc)| doc).collect();

        self.cache.put(cache_key, docs.clone());
        Ok(Response::ok("select", elapsed_ms(start)).with_list(docs))
    }

    /// Apply one message received on the replication RPC receiver.
    fn apply_replication_message(&self, message: ReplicationMessage) -> Result<()> {
        match message {
            ReplicationMessage::ReplicateInsertObject {
                db,
                table,
                row_id,
                doc,
                lsn,
            } => {
                let handle = self.catalog.table(&db, &table)?;
                handle.apply_replicated_insert(row_id, doc, lsn)?;
                self.stats.set_row_count(&db, &table, handle.row_count() as u64);
            }
            ReplicationMessage::TableReplicaObjectInsertOrReplace {
                db,
                table,
                row_id,
                placement,
            } => {
                let handle = self.catalog.table(&db, &table)?;
                handle.replica_object().set(row_id, placement);
            }
            ReplicationMessage::DeleteEverything => {
                for database in self.catalog.databases() {
                    self.catalog.drop_database(database.name())?;
                }
                self.cache.clear();
            }
            ReplicationMessage::QueryLog { query, node_id, lsn } => {
                tracing::debug!(%query, %node_id, lsn, "received query log broadcast");
            }
        }
        Ok(())
    }
}

impl ReplicationSink for Runtime {
    fn apply(&self, message: ReplicationMessage) {
        let name = message.name();
        if let Err(e) = self.apply_replication_message(message) {
            tracing::warn!(error = %e, message = name, "failed to apply replication message");
        }
    }
}

fn matches_equality(doc: &Value, column: &str, expected: &str) -> bool {
    match doc.get(column) {
        Some(Value::String(s)) => s == expected,
        Some(other) => other.to_string() == expected,
        None => false,
    }
}

fn select_cache_key(request: &SelectRequest) -> String {
    format!(
        "{}.{}|{:?}|{:?}|{:?}|{:?}|{}|{:?}",
        request.db,
        request.table,
        request.columns,
        predicate_key(&request.predicate),
        join_key(&request.join),
        request.order_by,
        request.distinct,
        aggregate_key(&request.aggregate),
    )
}

fn predicate_key(predicate: &Option<Predicate>) -> Option<(String, CompareOp, String)> {
    predicate
        .as_ref()
        .map(|p| (p.column.clone(), p.op, p.value.to_string()))
}

fn join_key(join: &Option<JoinSpec>) -> Option<(String, String, String, String)> {
    join.as_ref().map(|j| {
        (
            j.left_table.clone(),
            j.right_table.clone(),
            j.left_column.clone(),
            j.right_column.clone(),
        )
    })
}

fn aggregate_key(aggregate: &Option<(AggregateFunction, Option<String>)>) -> Option<String> {
    aggregate
        .as_ref()
        .map(|(function, column)| format!("{function:?}:{column:?}"))
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
