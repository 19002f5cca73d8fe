mod health_check;
mod helpers;
mod pg_store;
mod sweeps;
