mod helpers;
mod upsert_tests;
mod write_tests;
