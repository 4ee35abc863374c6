pub const SPBV10: &str = "spBv1.0";

pub const NODE_CONTROL_REBIRTH: &str = "Node Control/Rebirth";
pub const BDSEQ: &str = "bdSeq";

pub const NBIRTH: &str = "NBIRTH";
pub const NDEATH: &str = "NDEATH";
pub const NDATA: &str = "NDATA";
pub const NCMD: &str = "NCMD";

pub const DBIRTH: &str = "DBIRTH";
pub const DDEATH: &str = "DDEATH";
pub const DDATA: &str = "DDATA";
pub const DCMD: &str = "DCMD";
