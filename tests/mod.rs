mod support;

mod delivery_tests;
