pub mod de;
pub mod protocol;
pub mod types;
