mod entrypoint;

pub(crate) use entrypoint::run_master;
