pub mod sink_server;
