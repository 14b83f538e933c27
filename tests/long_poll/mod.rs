mod long_poll_test;
