//! Command definitions
//!
//! `Command` is the already-parsed form of the query language: the
//! surface grammar's lexical details (tokenizing
//! `insert into db.t (c1,c2) values('v1','v2')` and friends) are an
//! external collaborator's job; this crate only ever sees the structured
//! result.

use serde::{Deserialize, Serialize};

use crate::query::planner::{OptimizationLevel, SelectRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    ShowDatabases,
    ShowTables {
        db: String,
    },
    CreateDatabase {
        db: String,
    },
    DropDatabase {
        db: String,
    },
    CreateTable {
        db: String,
        table: String,
    },
    DropTable {
        db: String,
        table: String,
    },
    Insert {
        db: String,
        table: String,
        columns: Vec<String>,
        values: Vec<String>,
    },
    Update {
        db: String,
        table: String,
        set: Vec<(String, String)>,
        where_column: String,
        where_value: String,
    },
    Delete {
        db: String,
        table: String,
        where_column: String,
        where_value: String,
    },
    Select(SelectRequest),
    CreateIndex {
        db: String,
        table: String,
        column: String,
    },
    DropIndex {
        db: String,
        table: String,
        column: String,
    },
    ShowIndexes {
        on: Option<(String, String)>,
    },
    DeleteEverything,
    OptimizationStatus,
    OptimizationEnable,
    OptimizationDisable,
    OptimizationLevel(OptimizationLevel),
    CacheEnable,
    CacheDisable,
    CacheClear,
    CacheStats,
    StatisticsCollect {
        db: String,
        table: String,
    },
}

impl Command {
    /// Name used for logging and as a fallback for `Response::query` when
    /// the caller doesn't echo the original query text.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ShowDatabases => "show databases",
            Command::ShowTables { .. } => "show tables",
            Command::CreateDatabase { .. } => "create database",
            Command::DropDatabase { .. } => "drop database",
            Command::CreateTable { .. } => "create table",
            Command::DropTable { .. } => "drop table",
            Command::Insert { .. } => "insert",
            Command::Update { .. } => "update",
            Command::Delete { .. } => "delete",
            Command::Select(_) => "select",
            Command::CreateIndex { .. } => "create index",
            Command::DropIndex { .. } => "drop index",
            Command::ShowIndexes { .. } => "show indexes",
            Command::DeleteEverything => "delete everything",
            Command::OptimizationStatus => "optimization status",
            Command::OptimizationEnable => "optimization enable",
            Command::OptimizationDisable => "optimization disable",
            Command::OptimizationLevel(_) => "optimization level",
            Command::CacheEnable => "cache enable",
            Command::CacheDisable => "cache disable",
            Command::CacheClear => "cache clear",
            Command::CacheStats => "cache stats",
            Command::StatisticsCollect { .. } => "statistics collect",
        }
    }
}
