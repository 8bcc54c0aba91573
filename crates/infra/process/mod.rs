pub mod tokio_process_manager;
