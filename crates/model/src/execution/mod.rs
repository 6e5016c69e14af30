pub mod failed_item;
pub mod fetch_result;
pub mod work_item;
