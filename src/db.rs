pub mod cms;
pub mod prod_db;
