pub mod in_process;
pub mod redis_stream;
