mod pipeline_test;
mod schema_change_test;
