pub mod async_task;

pub mod file_io;

pub mod format;

pub mod net;

pub mod time;
