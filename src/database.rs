//! Database access layer: credential acquisition, the shared token-aware
//! connection, and the SQL operations behind the three tools.

pub mod connection;
pub mod credentials;
pub mod metadata;
pub mod query;
pub mod types;

pub use connection::{ConnectionGuard, ConnectionManager, Connector, RawConnection, TdsConnector};
pub use credentials::{AccessToken, CredentialProvider, TokenSource};
pub use metadata::{ColumnDef, TableRef};
pub use query::QueryResult;
