pub use sparkedge_node as node;
pub use sparkedge_types as types;
pub mod client {
    pub use sparkedge_client::*;
}
