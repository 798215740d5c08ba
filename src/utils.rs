pub mod csv_header;
pub mod lib_time;
