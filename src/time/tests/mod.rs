mod tests_codec;
