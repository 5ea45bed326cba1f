#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tempfile::TempDir;
use tokio::fs;

use schema_stream::{Schema, SchemaSet};

/// Test fixture paths
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");

        Self { fixtures_dir }
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.fixtures_dir.join("schemas")
    }

    pub fn xml_dir(&self) -> PathBuf {
        self.fixtures_dir.join("xml")
    }

    pub fn orders_schema(&self) -> PathBuf {
        self.schemas_dir().join("orders.xsd")
    }

    pub fn ambiguous_schema(&self) -> PathBuf {
        self.schemas_dir().join("ambiguous.xsd")
    }

    pub fn orders_valid_xml(&self) -> PathBuf {
        self.xml_dir().join("orders_valid.xml")
    }

    pub fn orders_invalid_xml(&self) -> PathBuf {
        self.xml_dir().join("orders_invalid.xml")
    }

    pub fn malformed_xml(&self) -> PathBuf {
        self.xml_dir().join("malformed.xml")
    }

    pub fn catalog_xml(&self) -> PathBuf {
        self.xml_dir().join("catalog.xml")
    }

    pub async fn orders_schema_set(&self) -> SchemaSet {
        SchemaSet::new().with(Schema::from_path(self.orders_schema()).await.unwrap())
    }

    pub async fn ambiguous_schema_set(&self) -> SchemaSet {
        SchemaSet::new().with(Schema::from_path(self.ambiguous_schema()).await.unwrap())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Header {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Created")]
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Customer {
    #[serde(rename = "@CustomerID")]
    pub id: String,
    #[serde(rename = "CompanyName")]
    pub company_name: String,
    #[serde(rename = "Phone")]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Order {
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    #[serde(rename = "Quantity")]
    pub quantity: u64,
}

/// Shared buffer observers can append to
#[derive(Debug)]
pub struct Collected<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for Collected<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone> Collected<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, item: T) {
        self.0.lock().unwrap().push(item);
    }

    pub fn items(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Orders document with `count` orders, every one valid
pub fn generate_orders_document(count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Root>
  <Header><Source>Generator</Source><Created>2026-03-01</Created></Header>
  <Customers/>
  <Orders>
"#,
    );
    for i in 0..count {
        xml.push_str(&format!(
            "    <Order><CustomerID>C{:05}</CustomerID><Quantity>{}</Quantity></Order>\n",
            i,
            i + 1
        ));
    }
    xml.push_str("  </Orders>\n</Root>\n");
    xml
}

/// Directory tree mixing valid, invalid and unrelated files
pub async fn create_temp_order_files(fixtures: &TestFixtures) -> std::io::Result<TempDir> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();

    fs::create_dir_all(root.join("2026/march")).await?;
    fs::create_dir_all(root.join("scratch")).await?;

    copy(&fixtures.orders_valid_xml(), &root.join("monday.xml")).await?;
    copy(&fixtures.orders_valid_xml(), &root.join("2026/march/tuesday.xml")).await?;
    copy(&fixtures.orders_invalid_xml(), &root.join("2026/march/wednesday.xml")).await?;
    fs::write(root.join("scratch/notes.txt"), "not an order file").await?;

    Ok(temp_dir)
}

async fn copy(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::copy(from, to).await.map(|_| ())
}
