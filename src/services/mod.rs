/// Business services grouped by domain
pub mod commerce;
