mod js_test;
