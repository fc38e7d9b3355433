//! Aggregated integration test binary.

mod caldav_client_tests;
mod compression_tests;
mod webdav_xml_tests;
