//! Serengeti CLI Client
//!
//! Connects to a running server and sends one structured command per
//! invocation, printing the resulting response.

use std::io::{Read, Write};
use std::net::TcpStream;

use clap::{Parser, Subcommand};

use serengeti_core::protocol::{self, Command};
use serengeti_core::query::planner::SelectRequest;

/// Serengeti CLI client.
#[derive(Parser, Debug)]
#[command(name = "serengeti-cli")]
#[command(about = "CLI client for the serengeti distributed key-document database")]
struct Args {
    /// Server address.
    #[arg(short, long, default_value = "127.0.0.1:1985")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
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
    /// Insert a document: columns and values given as equal-length lists.
    Insert {
        db: String,
        table: String,
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        values: Vec<String>,
    },
    Select {
        db: String,
        table: String,
        #[arg(long)]
        limit: Option<usize>,
    },
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
    ShowIndexes,
    OptimizationStatus,
    CacheStats,
}

fn main() {
    let args = Args::parse();

    let command = match args.command {
        Commands::ShowDatabases => Command::ShowDatabases,
        Commands::ShowTables { db } => Command::ShowTables { db },
        Commands::CreateDatabase { db } => Command::CreateDatabase { db },
        Commands::DropDatabase { db } => Command::DropDatabase { db },
        Commands::CreateTable { db, table } => Command::CreateTable { db, table },
        Commands::DropTable { db, table } => Command::DropTable { db, table },
        Commands::Insert {
            db,
            table,
            columns,
            values,
        } => Command::Insert {
            db,
            table,
            columns,
            values,
        },
        Commands::Select { db, table, limit } => Command::Select(SelectRequest {
            db,
            table,
            columns: Vec::new(),
            predicate: None,
            join: None,
            order_by: None,
            limit,
            distinct: false,
            aggregate: None,
        }),
        Commands::CreateIndex { db, table, column } => Command::CreateIndex { db, table, column },
        Commands::DropIndex { db, table, column } => Command::DropIndex { db, table, column },
        Commands::ShowIndexes => Command::ShowIndexes { on: None },
        Commands::OptimizationStatus => Command::OptimizationStatus,
        Commands::CacheStats => Command::CacheStats,
    };

    match send(&args.server, &command) {
        Ok(response) => {
            if response.executed {
                if let Some(list) = response.list {
                    for item in list {
                        println!("{item}");
                    }
                } else {
                    println!("OK ({} ms)", response.runtime_ms);
                }
                if let (Some(primary), Some(secondary)) = (response.primary, response.secondary) {
                    println!("placement: primary={primary} secondary={secondary}");
                }
            } else {
                eprintln!("error: {}", response.error.unwrap_or_default());
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("connection error: {e}");
            std::process::exit(1);
        }
    }
}

fn send(
    addr: &str,
    command: &Command,
) -> serengeti_core::Result<serengeti_core::protocol::Response> {
    let mut stream = TcpStream::connect(addr)?;
    let frame = protocol::encode_command(command)?;
    stream.write_all(&frame)?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = protocol::frame_len(&len_buf);
    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&len_buf);
    frame.resize(4 + len, 0);
    stream.read_exact(&mut frame[4..])?;
    protocol::decode_response(&frame)
}
