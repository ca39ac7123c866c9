mod support;

mod cleanup_tests;
mod drain_tests;
mod message_tests;
