// Test modules for pmap
// Network tests run against simulated gateways on loopback (see helpers)

mod facade_tests;
mod helpers;
