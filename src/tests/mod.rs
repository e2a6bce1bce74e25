mod support;

mod refresh_tests;
