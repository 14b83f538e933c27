mod resilience_test;
