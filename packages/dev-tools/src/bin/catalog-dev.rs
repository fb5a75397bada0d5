//! Development CLI for CareCatalog
//!
//! Opens the catalog described by the `CATALOG_*` environment variables and
//! runs one command against it. Handy for seeding a local database and
//! checking what a session would load.
//!
//! # Usage
//!
//! ```bash
//! # Seed a sample home-care catalog into an empty database
//! # (saves the draft in draft mode)
//! cargo run --bin catalog-dev -- seed
//!
//! # Print the forest with levels, prices and flags
//! cargo run --bin catalog-dev -- tree
//!
//! # Print statistics as JSON
//! cargo run --bin catalog-dev -- stats
//!
//! # Draft mode against a scratch database
//! CATALOG_PERSISTENCE=draft CATALOG_DB_PATH=/tmp/catalog.db cargo run --bin catalog-dev -- seed
//! ```
//!
//! Log output follows `RUST_LOG`, defaulting to `info`.

use bigdecimal::BigDecimal;
use carecatalog_core::{CatalogConfig, CatalogNode, CatalogService, NewNode, PersistenceMode};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: catalog-dev <seed|tree|stats>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let command = std::env::args().nth(1).unwrap_or_default();

    let config = CatalogConfig::from_env()?;
    tracing::info!(
        "Opening {} catalog at {}",
        config.persistence,
        config.database_path.display()
    );
    let mut session = config.open_session().await?;

    match command.as_str() {
        "seed" => seed(&mut session).await?,
        "tree" => print_tree(&session),
        "stats" => println!("{}", serde_json::to_string_pretty(&session.stats())?),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

/// Add a small sample catalog; an existing catalog is left alone
async fn seed(session: &mut CatalogService) -> anyhow::Result<()> {
    if !session.catalog().is_empty() {
        println!(
            "Catalog already has {} node(s); nothing seeded",
            session.catalog().len()
        );
        return Ok(());
    }

    let home = session
        .add_node(
            None,
            NewNode::named("Home Nursing").with_description("Care delivered at home"),
        )
        .await?;
    let weekly = session
        .add_node(
            Some(&home.id),
            NewNode::named("Weekly Visit")
                .with_price(BigDecimal::from_str("89.00")?)
                .recurring(true),
        )
        .await?;
    session
        .add_node(
            Some(&home.id),
            NewNode::named("Daily Visit")
                .with_price(BigDecimal::from_str("420.00")?)
                .recurring(true),
        )
        .await?;
    let meals = session
        .add_node(
            Some(&weekly.id),
            NewNode::named("Meal Delivery")
                .with_price(BigDecimal::from_str("35.50")?)
                .optional(true),
        )
        .await?;
    session
        .add_node(
            Some(&meals.id),
            NewNode::named("Vegetarian")
                .optional(true)
                .mutually_exclusive(true),
        )
        .await?;
    session
        .add_node(
            Some(&meals.id),
            NewNode::named("Low Sodium")
                .optional(true)
                .mutually_exclusive(true),
        )
        .await?;

    let lab = session
        .add_node(None, NewNode::named("Lab Tests"))
        .await?;
    session
        .add_node(
            Some(&lab.id),
            NewNode::named("Blood Panel").with_price(BigDecimal::from_str("45.00")?),
        )
        .await?;

    if session.mode() == PersistenceMode::Draft {
        let version = session.save().await?;
        println!("✅ Seeded catalog saved as version {}", version);
    } else {
        println!("✅ Seeded catalog ({} node(s))", session.catalog().len());
    }
    Ok(())
}

fn print_tree(session: &CatalogService) {
    if session.catalog().is_empty() {
        println!("(empty catalog)");
        return;
    }
    for root in session.catalog().roots() {
        print_node(root);
    }
}

fn print_node(node: &CatalogNode) {
    let indent = "  ".repeat(node.level.saturating_sub(1) as usize);
    let kind = node.kind().map_or("?", |kind| kind.as_str());

    let mut flags = Vec::new();
    if node.is_optional {
        flags.push("optional");
    }
    if node.is_recurring {
        flags.push("recurring");
    }
    if node.is_mutually_exclusive {
        flags.push("exclusive");
    }

    println!(
        "{}- {} [{}] {}{}",
        indent,
        node.name,
        kind,
        node.base_price,
        if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        }
    );
    for child in &node.children {
        print_node(child);
    }
}
