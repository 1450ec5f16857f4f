mod await_tests;
mod helpers;
