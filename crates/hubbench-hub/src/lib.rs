pub mod api;
pub mod collab;
pub mod hub;
pub mod store;

pub use api::{DEFAULT_PAGE_LIMIT, PAGINATION_MEDIA_TYPE};
pub use collab::{
    CollabError, InMemoryRouteTable, NullSessionLifecycle, RouteEntry, RouteTable,
    SessionLifecycle, SessionStatus,
};
pub use hub::{ApiHandle, Hub, HubConfig, HubError, RestoreStats, StoreSummary};
pub use store::{sqlite_url, HubStore, SessionEndpoint, StoreError, TenantRecord, DB_FILE_NAME};
