mod reference;

pub use self::reference::*;

/// Database information to use to create a client
pub enum DatabaseInfo {
    /// Auto-detect the database in use
    Auto,
    /// Create an empty testing database
    Test(String),
    /// Use the mock database
    Reference,
}

/// Database
#[derive(Clone)]
pub enum Database {
    /// Mock database
    Reference(ReferenceDb),
}

impl DatabaseInfo {
    /// Create a database client from the given database information
    pub async fn connect(self) -> Result<Database, String> {
        Ok(match self {
            DatabaseInfo::Auto | DatabaseInfo::Reference => Database::Reference(Default::default()),
            DatabaseInfo::Test(name) => {
                debug!("Creating reference database for {name}");
                Database::Reference(Default::default())
            }
        })
    }
}

impl Database {
    /// Remove all stored data
    pub async fn drop_database(&self) {
        match self {
            Database::Reference(db) => db.wipe().await,
        }
    }
}
