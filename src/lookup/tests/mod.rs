mod tests_hash;
