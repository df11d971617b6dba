pub mod order;
pub mod order_detail;
pub mod order_request_log;
