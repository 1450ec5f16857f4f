mod bracket_tests;
mod dispatch_tests;
mod helpers;
