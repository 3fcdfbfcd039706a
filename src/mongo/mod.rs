//! MongoDB shell-language support: a tolerant parser that turns a
//! `db.collection.op(args).chain()` string into a typed query the
//! adapter can dispatch, with BSON-type revival for shell literals
//! (`ObjectId`, `ISODate`, `NumberLong`, regex) that plain JSON can't
//! express.

pub mod args;
pub mod parser;

use serde_json::Value;

/// What a parsed query is ultimately dispatched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MongoTarget {
    Collection,
    Db,
    Admin,
}

/// A single chained call, e.g. `.sort({name:1})` or `.limit(5)`.
#[derive(Debug, Clone)]
pub struct ChainCall {
    pub name: String,
    pub args: Vec<Value>,
}

/// The normalized shape of a Mongo shell statement, per the data model:
/// `{database?, collection?, operation, args, chain, target}`.
#[derive(Debug, Clone)]
pub struct ParsedMongoQuery {
    pub database: Option<String>,
    pub collection: Option<String>,
    pub operation: String,
    pub args: Vec<Value>,
    pub chain: Vec<ChainCall>,
    pub target: MongoTarget,
}

pub use parser::parse_mongo_query;
