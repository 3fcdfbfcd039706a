//! MongoDB adapter: dispatches a [`crate::mongo::ParsedMongoQuery`] to
//! driver operations and infers a uniform result schema from whatever
//! documents come back.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{AggregateOptions, ClientOptions, FindOptions};
use mongodb::{Client, ClientSession};

use crate::adapters::{
    Adapter, ColumnEntry, ColumnInfo, DatabaseEntry, QueryOptions, QueryResult, TableEntry,
};
use crate::error::{GatewayError, Result};
use crate::mongo::args::{DATE_TAG, NUMBER_LONG_TAG, OID_TAG, REGEX_OPTIONS_TAG, REGEX_TAG};
use crate::mongo::{self, ChainCall, MongoTarget, ParsedMongoQuery};
use crate::security::sanitizer;

const DEFAULT_LIMIT: i64 = 1000;

pub struct MongoAdapter {
    client: Option<Client>,
    default_db: Option<String>,
    session: Option<ClientSession>,
    connected: bool,
    query_timeout: Duration,
}

impl MongoAdapter {
    pub fn new(query_timeout: Duration) -> Self {
        MongoAdapter { client: None, default_db: None, session: None, connected: false, query_timeout }
    }

    fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or_else(|| GatewayError::execution("not connected"))
    }

    fn resolve_database(&self, parsed: &ParsedMongoQuery, database_arg: Option<&str>) -> Result<String> {
        parsed
            .database
            .clone()
            .or_else(|| database_arg.map(String::from))
            .or_else(|| self.default_db.clone())
            .ok_or_else(|| GatewayError::client_input("no database selected"))
    }
}

#[async_trait]
impl Adapter for MongoAdapter {
    async fn connect(&mut self, url: &str) -> Result<()> {
        let options = ClientOptions::parse(url).await?;
        self.default_db = options.default_database.clone();
        self.client = Some(Client::with_options(options)?);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            let _ = session.abort_transaction().await;
        }
        self.client = None;
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected && self.client.is_some()
    }

    async fn execute_query(
        &mut self,
        query: &str,
        database: Option<&str>,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let parsed = mongo::parse_mongo_query(query)?;

        if let Some(msg) = sanitizer::deprecated_mongo_operation_message(&parsed.operation) {
            return Err(GatewayError::client_input(msg));
        }

        let is_destructive = sanitizer::is_destructive_mongo_operation(&parsed.operation);
        if is_destructive && !options.allow_destructive {
            return Ok(QueryResult::simulated(
                &parsed.operation,
                &format!("{} simulated; no changes were made", parsed.operation),
            ));
        }

        let result = match parsed.target {
            MongoTarget::Admin => self.dispatch_admin(&parsed).await?,
            MongoTarget::Db => self.dispatch_db(&parsed, database).await?,
            MongoTarget::Collection => self.dispatch_collection(&parsed, database, options).await?,
        };

        Ok(QueryResult { execution_time_ms: started.elapsed().as_millis() as u64, ..result })
    }

    async fn get_databases(&mut self) -> Result<Vec<DatabaseEntry>> {
        let names = self.client()?.list_database_names().await?;
        Ok(names
            .into_iter()
            .filter(|n| !matches!(n.as_str(), "admin" | "local" | "config"))
            .map(|name| DatabaseEntry { name })
            .collect())
    }

    async fn get_tables(&mut self, database: &str) -> Result<Vec<TableEntry>> {
        let names = self.client()?.database(database).list_collection_names().await?;
        Ok(names.into_iter().map(|name| TableEntry { name, kind: "collection".to_string() }).collect())
    }

    async fn get_columns(&mut self, database: &str, object: &str) -> Result<Vec<ColumnEntry>> {
        let collection = self.client()?.database(database).collection::<Document>(object);
        let sample_size: i64 = std::env::var("MONGO_SCHEMA_SAMPLE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let options = FindOptions::builder().limit(sample_size).build();
        let mut cursor = collection.find(doc! {}).with_options(options).await?;

        let mut inferred: BTreeMap<String, (String, bool)> = BTreeMap::new();
        while cursor.advance().await? {
            let document = cursor.deserialize_current()?;
            for (key, value) in document.iter() {
                inferred.entry(key.clone()).or_insert_with(|| (bson_type_name(value), key == "_id"));
            }
        }

        Ok(inferred
            .into_iter()
            .map(|(name, (type_name, primary_key))| ColumnEntry { name, type_name, nullable: true, primary_key })
            .collect())
    }

    async fn get_server_version(&mut self) -> Result<String> {
        let info = self
            .client()?
            .database("admin")
            .run_command(doc! {"buildInfo": 1})
            .await?;
        Ok(info.get_str("version").unwrap_or("unknown").to_string())
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(GatewayError::execution("a transaction is already active"));
        }
        let mut session = self.client()?.start_session().await?;
        session.start_transaction().await?;
        self.session = Some(session);
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => {
                session.commit_transaction().await?;
                self.session = None;
                Ok(())
            }
            None => Err(GatewayError::execution("no active transaction")),
        }
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => {
                session.abort_transaction().await?;
                self.session = None;
                Ok(())
            }
            None => Err(GatewayError::execution("no active transaction")),
        }
    }

    fn is_transaction_active(&self) -> bool {
        self.session.is_some()
    }

    async fn health_check(&mut self) -> Result<()> {
        self.client()?.database("admin").run_command(doc! {"ping": 1}).await?;
        Ok(())
    }

    async fn cleanup_database(&mut self, database: &str) -> Result<()> {
        self.client()?.database(database).drop().await?;
        Ok(())
    }

    async fn drop_all_user_databases(&mut self) -> Result<()> {
        let names = self.client()?.list_database_names().await?;
        for name in names {
            if !name.starts_with("u_") {
                continue;
            }
            if let Err(e) = self.cleanup_database(&name).await {
                tracing::warn!(database = %name, error = %e, "failed to drop user database");
            }
        }
        Ok(())
    }
}

impl MongoAdapter {
    async fn dispatch_admin(&mut self, parsed: &ParsedMongoQuery) -> Result<QueryResult> {
        match parsed.operation.as_str() {
            "listDatabases" => {
                let entries = self.get_databases().await?;
                let rows: Vec<BTreeMap<String, serde_json::Value>> = entries
                    .into_iter()
                    .map(|e| BTreeMap::from([("name".to_string(), serde_json::json!(e.name))]))
                    .collect();
                Ok(QueryResult {
                    columns: vec![ColumnInfo { name: "name".to_string(), type_name: "string".to_string() }],
                    row_count: rows.len(),
                    rows,
                    execution_time_ms: 0,
                })
            }
            "stats" => {
                let doc = self.client()?.database("admin").run_command(doc! {"serverStatus": 1}).await?;
                Ok(single_document_result(doc))
            }
            other => Err(GatewayError::client_input(format!("unsupported admin operation '{}'", other))),
        }
    }

    async fn dispatch_db(&mut self, parsed: &ParsedMongoQuery, database_arg: Option<&str>) -> Result<QueryResult> {
        let db_name = self.resolve_database(parsed, database_arg)?;
        let db = self.client()?.database(&db_name);

        match parsed.operation.as_str() {
            "use" => Ok(QueryResult::affected(0, None, 0)),
            "stats" => {
                let doc = db.run_command(doc! {"dbStats": 1}).await?;
                Ok(single_document_result(doc))
            }
            "listDatabases" => self.dispatch_admin(parsed).await,
            "dropDatabase" => {
                db.drop().await?;
                Ok(QueryResult::affected(1, None, 0))
            }
            "dropCollection" => {
                let name = string_arg(&parsed.args, 0, "dropCollection requires a collection name")?;
                db.collection::<Document>(&name).drop().await?;
                Ok(QueryResult::affected(1, None, 0))
            }
            "createCollection" => {
                let name = string_arg(&parsed.args, 0, "createCollection requires a collection name")?;
                db.create_collection(&name).await?;
                Ok(QueryResult::affected(1, None, 0))
            }
            "listCollections" | "getCollectionNames" => {
                let names = db.list_collection_names().await?;
                let rows = names
                    .into_iter()
                    .map(|name| BTreeMap::from([("name".to_string(), serde_json::json!(name))]))
                    .collect::<Vec<_>>();
                let row_count = rows.len();
                Ok(QueryResult {
                    rows,
                    columns: vec![ColumnInfo { name: "name".to_string(), type_name: "string".to_string() }],
                    row_count,
                    execution_time_ms: 0,
                })
            }
            other => Err(GatewayError::client_input(format!("unsupported db-level operation '{}'", other))),
        }
    }

    async fn dispatch_collection(
        &mut self,
        parsed: &ParsedMongoQuery,
        database_arg: Option<&str>,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let db_name = self.resolve_database(parsed, database_arg)?;
        let collection_name = parsed
            .collection
            .clone()
            .ok_or_else(|| GatewayError::client_input("no collection selected"))?;
        let collection = self.client()?.database(&db_name).collection::<Document>(&collection_name);

        match parsed.operation.as_str() {
            "find" => self.run_find(&collection, parsed, options).await,
            "aggregate" => self.run_aggregate(&collection, parsed, options).await,
            "findOne" => {
                let filter = doc_arg(&parsed.args, 0)?;
                let document = collection.find_one(filter).await?;
                Ok(documents_result(document.into_iter().collect()))
            }
            "countDocuments" | "count" => {
                let filter = doc_arg(&parsed.args, 0)?;
                let count = collection.count_documents(filter).await?;
                Ok(count_result(count))
            }
            "estimatedDocumentCount" => {
                let count = collection.estimated_document_count().await?;
                Ok(count_result(count))
            }
            "distinct" => {
                let field = string_arg(&parsed.args, 0, "distinct requires a field name")?;
                let filter = if parsed.args.len() > 1 { doc_arg(&parsed.args, 1)? } else { doc! {} };
                let values = collection.distinct(&field, filter).await?;
                let rows = values
                    .into_iter()
                    .map(|v| BTreeMap::from([(field.clone(), bson_to_json(&v))]))
                    .collect::<Vec<_>>();
                let row_count = rows.len();
                Ok(QueryResult {
                    rows,
                    columns: vec![ColumnInfo { name: field, type_name: "unknown".to_string() }],
                    row_count,
                    execution_time_ms: 0,
                })
            }
            "insertOne" => {
                let document = doc_arg(&parsed.args, 0)?;
                let result = collection.insert_one(document).await?;
                Ok(QueryResult::affected(1, Some(bson_to_json(&result.inserted_id)), 0))
            }
            "insertMany" => {
                let documents = array_of_docs_arg(&parsed.args, 0)?;
                let count = documents.len() as u64;
                let result = collection.insert_many(documents).await?;
                Ok(QueryResult::affected(count, Some(serde_json::json!(result.inserted_ids.len())), 0))
            }
            "updateOne" | "updateMany" | "replaceOne" => {
                let filter = doc_arg(&parsed.args, 0)?;
                let update = doc_arg(&parsed.args, 1)?;
                let modified = match parsed.operation.as_str() {
                    "updateOne" => collection.update_one(filter, update).await?.modified_count,
                    "updateMany" => collection.update_many(filter, update).await?.modified_count,
                    _ => collection.replace_one(filter, update).await?.modified_count,
                };
                Ok(QueryResult::affected(modified, None, 0))
            }
            "deleteOne" | "deleteMany" => {
                let filter = doc_arg(&parsed.args, 0)?;
                let deleted = if parsed.operation == "deleteOne" {
                    collection.delete_one(filter).await?.deleted_count
                } else {
                    collection.delete_many(filter).await?.deleted_count
                };
                Ok(QueryResult::affected(deleted, None, 0))
            }
            "findOneAndUpdate" => {
                let filter = doc_arg(&parsed.args, 0)?;
                let update = doc_arg(&parsed.args, 1)?;
                let document = collection.find_one_and_update(filter, update).await?;
                Ok(documents_result(document.into_iter().collect()))
            }
            "findOneAndDelete" => {
                let filter = doc_arg(&parsed.args, 0)?;
                let document = collection.find_one_and_delete(filter).await?;
                Ok(documents_result(document.into_iter().collect()))
            }
            "findOneAndReplace" => {
                let filter = doc_arg(&parsed.args, 0)?;
                let replacement = doc_arg(&parsed.args, 1)?;
                let document = collection.find_one_and_replace(filter, replacement).await?;
                Ok(documents_result(document.into_iter().collect()))
            }
            "createIndex" => {
                let keys = doc_arg(&parsed.args, 0)?;
                let model = mongodb::IndexModel::builder().keys(keys).build();
                let name = collection.create_index(model).await?.index_name;
                Ok(QueryResult::affected(1, Some(serde_json::json!(name)), 0))
            }
            "dropIndex" => {
                let name = string_arg(&parsed.args, 0, "dropIndex requires an index name")?;
                collection.drop_index(&name).await?;
                Ok(QueryResult::affected(1, None, 0))
            }
            "listIndexes" | "getIndexes" => {
                let mut cursor = collection.list_indexes().await?;
                let mut rows = Vec::new();
                while cursor.advance().await? {
                    let model = cursor.deserialize_current()?;
                    let mut row = BTreeMap::new();
                    row.insert("name".to_string(), serde_json::json!(model.options.and_then(|o| o.name).unwrap_or_default()));
                    rows.push(row);
                }
                let row_count = rows.len();
                Ok(QueryResult { rows, columns: Vec::new(), row_count, execution_time_ms: 0 })
            }
            "stats" => {
                let document = self
                    .client()?
                    .database(&db_name)
                    .run_command(doc! {"collStats": collection_name.clone()})
                    .await?;
                Ok(single_document_result(document))
            }
            "drop" => {
                collection.drop().await?;
                Ok(QueryResult::affected(1, None, 0))
            }
            "bulkWrite" => self.run_bulk_write(&collection, parsed).await,
            other => Err(GatewayError::client_input(format!("unsupported collection operation '{}'", other))),
        }
    }

    async fn run_find(
        &self,
        collection: &mongodb::Collection<Document>,
        parsed: &ParsedMongoQuery,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let filter = doc_arg(&parsed.args, 0)?;
        let mut find_options = FindOptions::builder().max_time(self.query_timeout).build();
        find_options.projection = projection_arg(&parsed.args)?;
        apply_cursor_chain(&mut find_options, &parsed.chain)?;
        if find_options.limit.is_none() {
            find_options.limit = Some(options.limit.unwrap_or(DEFAULT_LIMIT));
        }

        let mut cursor = collection.find(filter).with_options(find_options).await?;
        let mut documents = Vec::new();
        while cursor.advance().await? {
            documents.push(cursor.deserialize_current()?);
        }
        Ok(documents_result(documents))
    }

    async fn run_aggregate(
        &self,
        collection: &mongodb::Collection<Document>,
        parsed: &ParsedMongoQuery,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let mut pipeline = array_of_docs_arg(&parsed.args, 0)?;
        for call in &parsed.chain {
            match call.name.as_str() {
                "sort" => pipeline.push(doc! {"$sort": doc_arg(&call.args, 0)?}),
                "limit" => pipeline.push(doc! {"$limit": int_arg(&call.args, 0)?}),
                "skip" => pipeline.push(doc! {"$skip": int_arg(&call.args, 0)?}),
                "project" => pipeline.push(doc! {"$project": doc_arg(&call.args, 0)?}),
                other => return Err(GatewayError::client_input(format!("unknown chain method '{}'", other))),
            }
        }
        if !parsed.chain.iter().any(|c| c.name == "limit") {
            pipeline.push(doc! {"$limit": options.limit.unwrap_or(DEFAULT_LIMIT)});
        }

        let agg_options = AggregateOptions::builder().max_time(self.query_timeout).build();
        let mut cursor = collection.aggregate(pipeline).with_options(agg_options).await?;
        let mut documents = Vec::new();
        while cursor.advance().await? {
            documents.push(cursor.deserialize_current()?);
        }
        Ok(documents_result(documents))
    }

    async fn run_bulk_write(
        &self,
        collection: &mongodb::Collection<Document>,
        parsed: &ParsedMongoQuery,
    ) -> Result<QueryResult> {
        let operations = parsed
            .args
            .first()
            .and_then(|v| v.as_array())
            .ok_or_else(|| GatewayError::client_input("bulkWrite requires an array of operations"))?;

        let mut affected = 0u64;
        for op in operations {
            let obj = op.as_object().ok_or_else(|| GatewayError::client_input("bulkWrite operation must be an object"))?;
            if let Some(spec) = obj.get("insertOne") {
                let document = json_to_document(spec.get("document").unwrap_or(spec))?;
                collection.insert_one(document).await?;
                affected += 1;
            } else if let Some(spec) = obj.get("updateOne") {
                let empty = serde_json::Value::Object(serde_json::Map::new());
                let filter = json_to_document(spec.get("filter").unwrap_or(&empty))?;
                let update = json_to_document(spec.get("update").unwrap_or(&empty))?;
                affected += collection.update_one(filter, update).await?.modified_count;
            } else if let Some(spec) = obj.get("deleteOne") {
                let empty = serde_json::Value::Object(serde_json::Map::new());
                let filter = json_to_document(spec.get("filter").unwrap_or(&empty))?;
                affected += collection.delete_one(filter).await?.deleted_count;
            } else {
                return Err(GatewayError::client_input("unsupported bulkWrite operation shape"));
            }
        }
        Ok(QueryResult::affected(affected, None, 0))
    }
}

fn apply_cursor_chain(find_options: &mut FindOptions, chain: &[ChainCall]) -> Result<()> {
    for call in chain {
        match call.name.as_str() {
            "sort" => find_options.sort = Some(doc_arg(&call.args, 0)?),
            "limit" => find_options.limit = Some(int_arg(&call.args, 0)?),
            "skip" => find_options.skip = Some(int_arg(&call.args, 0)?.max(0) as u64),
            "project" => find_options.projection = Some(doc_arg(&call.args, 0)?),
            other => return Err(GatewayError::client_input(format!("unknown chain method '{}'", other))),
        }
    }
    Ok(())
}

fn string_arg(args: &[serde_json::Value], idx: usize, missing_message: &str) -> Result<String> {
    args.get(idx)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| GatewayError::client_input(missing_message.to_string()))
}

fn int_arg(args: &[serde_json::Value], idx: usize) -> Result<i64> {
    args.get(idx)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| GatewayError::client_input("expected a numeric argument"))
}

fn doc_arg(args: &[serde_json::Value], idx: usize) -> Result<Document> {
    match args.get(idx) {
        Some(v) => json_to_document(v),
        None => Ok(doc! {}),
    }
}

/// A `find` second argument is treated as a projection only when it is
/// a non-empty object, per the documented policy for the open question
/// over `find`'s second-argument shape.
fn projection_arg(args: &[serde_json::Value]) -> Result<Option<Document>> {
    match args.get(1) {
        Some(serde_json::Value::Object(map)) if !map.is_empty() => Ok(Some(doc_arg(args, 1)?)),
        _ => Ok(None),
    }
}

fn array_of_docs_arg(args: &[serde_json::Value], idx: usize) -> Result<Vec<Document>> {
    let array = args
        .get(idx)
        .and_then(|v| v.as_array())
        .ok_or_else(|| GatewayError::client_input("expected an array argument"))?;
    array.iter().map(json_to_document).collect()
}

fn json_to_document(value: &serde_json::Value) -> Result<Document> {
    match json_to_bson(value)? {
        Bson::Document(d) => Ok(d),
        _ => Err(GatewayError::client_input("expected a document argument")),
    }
}

/// Convert a JSON value into BSON, reviving the tagged markers left by
/// [`crate::mongo::args`] (`ObjectId`, `ISODate`/`new Date`, `NumberLong`,
/// regex literals) back into their BSON-typed form.
fn json_to_bson(value: &serde_json::Value) -> Result<Bson> {
    use serde_json::Value;
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else {
                Bson::Double(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect::<Result<_>>()?),
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(hex) = map.get(OID_TAG).and_then(|v| v.as_str()) {
                    let oid = mongodb::bson::oid::ObjectId::parse_str(hex)
                        .map_err(|e| GatewayError::client_input(format!("invalid ObjectId: {}", e)))?;
                    return Ok(Bson::ObjectId(oid));
                }
                if let Some(text) = map.get(DATE_TAG).and_then(|v| v.as_str()) {
                    let parsed = chrono::DateTime::parse_from_rfc3339(text)
                        .map_err(|e| GatewayError::client_input(format!("invalid date: {}", e)))?;
                    return Ok(Bson::DateTime(mongodb::bson::DateTime::from_chrono(parsed.with_timezone(&chrono::Utc))));
                }
                if let Some(text) = map.get(NUMBER_LONG_TAG).and_then(|v| v.as_str()) {
                    let n: i64 = text
                        .parse()
                        .map_err(|_| GatewayError::client_input("invalid NumberLong value"))?;
                    return Ok(Bson::Int64(n));
                }
            }
            if let Some(pattern) = map.get(REGEX_TAG).and_then(|v| v.as_str()) {
                let options = map.get(REGEX_OPTIONS_TAG).and_then(|v| v.as_str()).unwrap_or("");
                return Ok(Bson::RegularExpression(mongodb::bson::Regex {
                    pattern: pattern.to_string(),
                    options: options.to_string(),
                }));
            }
            let mut document = Document::new();
            for (k, v) in map {
                document.insert(k.clone(), json_to_bson(v)?);
            }
            Bson::Document(document)
        }
    })
}

fn bson_to_json(value: &Bson) -> serde_json::Value {
    match value {
        Bson::Null => serde_json::Value::Null,
        Bson::Boolean(b) => serde_json::json!(b),
        Bson::Int32(i) => serde_json::json!(i),
        Bson::Int64(i) => serde_json::json!(i),
        Bson::Double(d) => serde_json::json!(d),
        Bson::String(s) => serde_json::json!(s),
        Bson::ObjectId(oid) => serde_json::json!(oid.to_hex()),
        Bson::DateTime(dt) => serde_json::json!(dt.try_to_rfc3339_string().unwrap_or_default()),
        Bson::Array(items) => serde_json::Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => {
            serde_json::Value::Object(doc.iter().map(|(k, v)| (k.clone(), bson_to_json(v))).collect())
        }
        Bson::RegularExpression(re) => serde_json::json!(format!("/{}/{}", re.pattern, re.options)),
        Bson::Decimal128(d) => serde_json::json!(d.to_string()),
        other => serde_json::json!(other.to_string()),
    }
}

/// Fixed BSON-type-to-schema-type mapping used for column inference.
fn bson_type_name(value: &Bson) -> String {
    match value {
        Bson::Null => "null",
        Bson::Boolean(_) => "boolean",
        Bson::Int32(_) | Bson::Int64(_) => "integer",
        Bson::Double(_) => "number",
        Bson::String(_) => "string",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "datetime",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::RegularExpression(_) => "regex",
        Bson::Decimal128(_) => "decimal",
        _ => "unknown",
    }
    .to_string()
}

fn documents_result(documents: Vec<Document>) -> QueryResult {
    let mut columns_order: Vec<String> = Vec::new();
    let mut column_types: BTreeMap<String, String> = BTreeMap::new();

    for document in &documents {
        for (key, value) in document.iter() {
            if !column_types.contains_key(key) {
                columns_order.push(key.clone());
                column_types.insert(key.clone(), bson_type_name(value));
            }
        }
    }

    let rows = documents
        .iter()
        .map(|document| {
            document
                .iter()
                .map(|(k, v)| (k.clone(), bson_to_json(v)))
                .collect::<BTreeMap<_, _>>()
        })
        .collect::<Vec<_>>();

    let columns = columns_order
        .into_iter()
        .map(|name| {
            let type_name = column_types.remove(&name).unwrap_or_else(|| "unknown".to_string());
            ColumnInfo { name, type_name }
        })
        .collect();

    let row_count = rows.len();
    QueryResult { rows, columns, row_count, execution_time_ms: 0 }
}

fn count_result(count: u64) -> QueryResult {
    let mut row = BTreeMap::new();
    row.insert("count".to_string(), serde_json::json!(count));
    QueryResult {
        rows: vec![row],
        columns: vec![ColumnInfo { name: "count".to_string(), type_name: "integer".to_string() }],
        row_count: 1,
        execution_time_ms: 0,
    }
}

fn single_document_result(document: Document) -> QueryResult {
    documents_result(vec![document])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bson_type_name_covers_common_types() {
        assert_eq!(bson_type_name(&Bson::Int32(1)), "integer");
        assert_eq!(bson_type_name(&Bson::String("x".into())), "string");
        assert_eq!(bson_type_name(&Bson::Null), "null");
    }

    #[test]
    fn json_to_bson_revives_object_id() {
        let value = serde_json::json!({OID_TAG: "507f1f77bcf86cd799439011"});
        match json_to_bson(&value).unwrap() {
            Bson::ObjectId(oid) => assert_eq!(oid.to_hex(), "507f1f77bcf86cd799439011"),
            other => panic!("expected ObjectId, got {:?}", other),
        }
    }

    #[test]
    fn json_to_bson_revives_regex() {
        let value = serde_json::json!({REGEX_TAG: "^a", REGEX_OPTIONS_TAG: "i"});
        match json_to_bson(&value).unwrap() {
            Bson::RegularExpression(re) => {
                assert_eq!(re.pattern, "^a");
                assert_eq!(re.options, "i");
            }
            other => panic!("expected regex, got {:?}", other),
        }
    }

    #[test]
    fn documents_result_infers_columns_from_first_occurrence() {
        let docs = vec![
            doc! {"name": "A", "age": 10},
            doc! {"name": "B", "age": 11},
        ];
        let result = documents_result(docs);
        assert_eq!(result.row_count, 2);
        assert!(result.columns.iter().any(|c| c.name == "name" && c.type_name == "string"));
    }

    #[test]
    fn projection_arg_requires_non_empty_object() {
        let empty = vec![serde_json::json!({}), serde_json::json!({})];
        assert!(projection_arg(&empty).unwrap().is_none());
        let populated = vec![serde_json::json!({}), serde_json::json!({"name": 1})];
        assert!(projection_arg(&populated).unwrap().is_some());
    }
}
